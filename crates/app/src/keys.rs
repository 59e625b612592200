//! Mic-button relay.
//!
//! The hardware reports auto-repeated key-down signals while the button
//! is held. Only the first down of a press and the single matching up are
//! forwarded; everything in between is swallowed.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
    Down,
    Up,
}

#[derive(Debug, Default)]
pub struct KeyRelay {
    pressed: bool,
}

impl KeyRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw key-down signal. Returns an event only for the first down of a
    /// press; repeats while held return `None`.
    pub fn key_down(&mut self) -> Option<KeyKind> {
        if self.pressed {
            return None;
        }
        self.pressed = true;
        Some(KeyKind::Down)
    }

    /// Raw key-up signal. Returns exactly one event per release; an up
    /// without a preceding down is ignored.
    pub fn key_up(&mut self) -> Option<KeyKind> {
        if !self.pressed {
            return None;
        }
        self.pressed = false;
        Some(KeyKind::Up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeats_while_held_are_swallowed() {
        let mut relay = KeyRelay::new();
        assert_eq!(relay.key_down(), Some(KeyKind::Down));
        assert_eq!(relay.key_down(), None);
        assert_eq!(relay.key_down(), None);
        assert_eq!(relay.key_up(), Some(KeyKind::Up));
    }

    #[test]
    fn each_press_pairs_one_down_with_one_up() {
        let mut relay = KeyRelay::new();
        for _ in 0..3 {
            assert_eq!(relay.key_down(), Some(KeyKind::Down));
            assert_eq!(relay.key_up(), Some(KeyKind::Up));
        }
    }

    #[test]
    fn up_without_down_is_ignored() {
        let mut relay = KeyRelay::new();
        assert_eq!(relay.key_up(), None);
    }
}
