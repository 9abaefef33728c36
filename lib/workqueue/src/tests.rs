use crate::WorkQueue;

#[test]
fn queued_elements_are_not_duplicated() {
    let mut queue: WorkQueue<usize> = WorkQueue::with_none(8);
    assert!(queue.insert(3));
    assert!(queue.insert(1));
    assert!(!queue.insert(3));
    assert_eq!(queue.len(), 2);
    assert_eq!(queue.pop(), Some(3));
    assert!(queue.insert(3));
    assert_eq!(queue.pop(), Some(1));
    assert_eq!(queue.pop(), Some(3));
    assert!(queue.is_empty());
}

#[test]
fn full_queue_is_ordered() {
    let mut queue: WorkQueue<usize> = WorkQueue::with_all(3);
    queue.extend([2, 0]);
    assert_eq!(format!("{queue:?}"), "[0, 1, 2]");
    assert_eq!(queue.pop(), Some(0));
    queue.extend([2, 0]);
    assert_eq!(format!("{queue:?}"), "[1, 2, 0]");
}
