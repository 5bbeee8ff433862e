//! SAP GUI virtual key numbers as accepted by `GuiFrameWindow.SendVKey`.

/// A virtual key. `0` is Enter, `1..=12` are F1..F12, followed by the
/// Shift, Ctrl and Ctrl+Shift blocks of twelve function keys each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VKey(u8);

impl VKey {
    pub const ENTER: VKey = VKey(0);
    pub const F1: VKey = VKey(1);
    pub const F2: VKey = VKey(2);
    pub const F3: VKey = VKey(3);
    pub const F4: VKey = VKey(4);
    pub const F5: VKey = VKey(5);
    pub const F6: VKey = VKey(6);
    pub const F7: VKey = VKey(7);
    pub const F8: VKey = VKey(8);
    pub const F9: VKey = VKey(9);
    pub const F10: VKey = VKey(10);
    pub const F11: VKey = VKey(11);
    pub const F12: VKey = VKey(12);

    pub const HELP: VKey = VKey::F1;
    pub const POSSIBLE_ENTRIES: VKey = VKey::F4;
    pub const EXECUTE: VKey = VKey::F8;
    pub const SAVE: VKey = VKey::F11;
    pub const BACK: VKey = VKey::F3;
    /// Shift+F3.
    pub const EXIT: VKey = VKey(15);
    pub const CANCEL: VKey = VKey::F12;

    pub const fn new(code: u8) -> Self {
        VKey(code)
    }

    pub const fn code(self) -> u8 {
        self.0
    }

    /// `F<n>` for `n` in `1..=12`.
    pub fn function(n: u8) -> Option<VKey> {
        Self::block(0, n)
    }

    /// `Shift+F<n>`.
    pub fn shift_function(n: u8) -> Option<VKey> {
        Self::block(1, n)
    }

    /// `Ctrl+F<n>`.
    pub fn ctrl_function(n: u8) -> Option<VKey> {
        Self::block(2, n)
    }

    /// `Ctrl+Shift+F<n>`.
    pub fn ctrl_shift_function(n: u8) -> Option<VKey> {
        Self::block(3, n)
    }

    fn block(block: u8, n: u8) -> Option<VKey> {
        (1..=12).contains(&n).then(|| VKey(block * 12 + n))
    }
}

impl From<u8> for VKey {
    fn from(code: u8) -> Self {
        VKey(code)
    }
}

impl std::fmt::Display for VKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (modifier, n) = match self.0 {
            0 => return write!(f, "Enter"),
            n @ 1..=12 => ("", n),
            n @ 13..=24 => ("Shift+", n - 12),
            n @ 25..=36 => ("Ctrl+", n - 24),
            n @ 37..=48 => ("Ctrl+Shift+", n - 36),
            n => return write!(f, "VKey({n})"),
        };
        write!(f, "{modifier}F{n}")
    }
}
