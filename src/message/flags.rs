use bitflags::bitflags;

bitflags! {
    /// Flags carried by a single frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MsgFlags: u8 {
        /// Another frame of the same logical message follows this one.
        const MORE = 0b01;
    }
}
