/// Tuning knobs of the flow graph passes.
///
/// None of these affect correctness; they trade compile time against code quality.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowOptConfig {
    /// Ahead of time compilation: more generous code size budgets.
    pub aot: bool,
    /// Run the reordering pass.
    pub reorder_blocks: bool,
    /// Allow duplicating small conditional blocks into their predecessors.
    pub tail_duplication: bool,
    /// Run the head and tail merge pass.
    pub head_tail_merge: bool,
    /// The continuation of a call-handler pair is an entry of the function (required when the
    /// unwinder expects the continuation to stay in place).
    pub callhandler_continuations_are_entries: bool,
    /// Loop pre-headers must be kept as separate blocks.
    pub loops_require_preheaders: bool,

    /// Percentage of executions that must take a conditional branch before its sense is
    /// reversed.
    pub reversal_threshold: u32,
    /// Base cost budget for duplicating a conditional block.
    pub tail_dup_budget: u32,
    /// Added to the duplication budget for every hot/cold boundary the duplication crosses.
    pub tail_dup_budget_step: u32,
    /// Factor applied to the duplication budget when compiling ahead of time.
    pub aot_budget_factor: u32,
    /// Upper bound of the fixpoint loops.
    pub iteration_limit: u32,
    /// Maximum number of candidates a merge considers at once.
    pub merge_limit: usize,
    /// Fraction of executions a switch case must take before it is peeled off.
    pub dominant_case_threshold: f64,
}

impl Default for FlowOptConfig {
    fn default() -> Self {
        FlowOptConfig {
            aot: false,
            reorder_blocks: true,
            tail_duplication: true,
            head_tail_merge: true,
            callhandler_continuations_are_entries: false,
            loops_require_preheaders: false,
            reversal_threshold: 51,
            tail_dup_budget: 6,
            tail_dup_budget_step: 6,
            aot_budget_factor: 2,
            iteration_limit: 10,
            merge_limit: 50,
            dominant_case_threshold: 0.55,
        }
    }
}
