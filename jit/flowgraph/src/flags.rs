use bitflags::bitflags;

bitflags! {
    /// Per block properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlockFlags: u32 {
        /// The block has been removed from the layout and must not be touched anymore.
        const REMOVED = 1 << 0;
        /// Created by the compiler rather than by the importer.
        const INTERNAL = 1 << 1;
        /// Protected from removal (region boundaries, handler entries, ...).
        const DONT_REMOVE = 1 << 2;
        /// Created by the importer.
        const IMPORTED = 1 << 3;
        const LOOP_PREHEADER = 1 << 4;
        const LOOP_HEAD = 1 << 5;
        /// An `Always` block that must stay an `Always` block (the continuation of a
        /// call-handler pair).
        const KEEP_ALWAYS = 1 << 6;
        const RUN_RARELY = 1 << 7;
        /// The weight of the block was obtained from profile data.
        const PROF_WEIGHT = 1 << 8;
        const BACKWARD_JUMP = 1 << 9;
        const GC_SAFE_POINT = 1 << 10;
        const HAS_CALL = 1 << 11;
        const HAS_IDX_LEN = 1 << 12;
        const HAS_NULLCHECK = 1 << 13;
        const HAS_NEWOBJ = 1 << 14;
        /// The block is dominated by the entry of an exception handler or filter.
        const DOMINATED_BY_EXCEPTIONAL_ENTRY = 1 << 15;
        /// The block is a loop entry candidate that reordering must keep in place.
        const LOOP_ALIGN = 1 << 16;

        /// Flags that the survivor of a compaction inherits from the absorbed block.
        const COMPACT_UPD = Self::GC_SAFE_POINT.bits()
            | Self::HAS_CALL.bits()
            | Self::HAS_IDX_LEN.bits()
            | Self::HAS_NULLCHECK.bits()
            | Self::HAS_NEWOBJ.bits()
            | Self::BACKWARD_JUMP.bits()
            | Self::LOOP_PREHEADER.bits();

        /// Flags that follow a statement when it is moved into another block.
        const COPY_PROPAGATE = Self::HAS_IDX_LEN.bits()
            | Self::HAS_NULLCHECK.bits()
            | Self::HAS_NEWOBJ.bits();

        /// Flags that stay with the upstream block when a block is split.
        const SPLIT_LOST = Self::DONT_REMOVE.bits()
            | Self::LOOP_HEAD.bits()
            | Self::LOOP_PREHEADER.bits()
            | Self::LOOP_ALIGN.bits();

        /// Flags that move to the downstream block when a block is split.
        const SPLIT_GAINED = Self::KEEP_ALWAYS.bits() | Self::BACKWARD_JUMP.bits();
    }
}

impl BlockFlags {
    pub fn is_removed(self) -> bool {
        self.contains(BlockFlags::REMOVED)
    }

    pub fn is_run_rarely(self) -> bool {
        self.contains(BlockFlags::RUN_RARELY)
    }

    pub fn has_profile_weight(self) -> bool {
        self.contains(BlockFlags::PROF_WEIGHT)
    }
}
