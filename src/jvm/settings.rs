use bitflags::bitflags;

bitflags! {
    /// What the class writer should compute on its own
    ///
    /// Without any flags, the writer trusts the `max_stack` / `max_locals` given to
    /// `visit_maxs` and writes out the frames given to `visit_frame`.
    #[derive(Default)]
    pub struct WriterFlags: u8 {
        /// Compute `max_stack` and `max_locals` (arguments to `visit_maxs` are ignored)
        const COMPUTE_MAXS = 0x01;

        /// Compute the `StackMapTable` of every method (implies `COMPUTE_MAXS`)
        ///
        /// Exception handlers are then wired into the control flow graph with edges carrying
        /// the caught type, and unreachable code is replaced with `nop ... athrow`.
        const COMPUTE_FRAMES = 0x02;
    }
}

bitflags! {
    /// Parts of the input the class reader should not report
    #[derive(Default)]
    pub struct ReaderFlags: u8 {
        /// Skip method bodies entirely (no `visit_code` or instruction events)
        const SKIP_CODE = 0x01;

        /// Skip `SourceFile`, `LineNumberTable`, `LocalVariableTable`, and
        /// `LocalVariableTypeTable`
        const SKIP_DEBUG = 0x02;

        /// Skip the `StackMapTable` (no `visit_frame` events)
        const SKIP_FRAMES = 0x04;
    }
}

impl WriterFlags {
    pub fn computes_maxs(self) -> bool {
        self.intersects(WriterFlags::COMPUTE_MAXS | WriterFlags::COMPUTE_FRAMES)
    }

    pub fn computes_frames(self) -> bool {
        self.contains(WriterFlags::COMPUTE_FRAMES)
    }
}
