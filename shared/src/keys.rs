//! Key codes carried inside `Input` messages.
//!
//! Printable keys travel as their Unicode scalar value; navigation keys get
//! codes above the Unicode range so the two can never collide. Both ends of
//! the wire share this mapping.

use crossterm::event::KeyCode;

const SPECIAL_BASE: i32 = 0x0110_0000;

pub const KEY_UP: i32 = SPECIAL_BASE + 1;
pub const KEY_DOWN: i32 = SPECIAL_BASE + 2;
pub const KEY_LEFT: i32 = SPECIAL_BASE + 3;
pub const KEY_RIGHT: i32 = SPECIAL_BASE + 4;
pub const KEY_ENTER: i32 = SPECIAL_BASE + 5;
pub const KEY_ESC: i32 = SPECIAL_BASE + 6;
/// Raw mode disables ISIG, so ctrl-c arrives as a key event rather than a
/// signal and gets its own code.
pub const KEY_CTRL_C: i32 = SPECIAL_BASE + 7;

/// Maps a terminal key event to its wire code. Keys the games never use map
/// to `None` and are not sent.
pub fn encode_key(code: KeyCode) -> Option<i32> {
    match code {
        KeyCode::Up => Some(KEY_UP),
        KeyCode::Down => Some(KEY_DOWN),
        KeyCode::Left => Some(KEY_LEFT),
        KeyCode::Right => Some(KEY_RIGHT),
        KeyCode::Enter => Some(KEY_ENTER),
        KeyCode::Esc => Some(KEY_ESC),
        KeyCode::Char(c) => Some(c as i32),
        _ => None,
    }
}

/// True when the key matches the given character, ASCII case-insensitive.
pub fn is_char(key: i32, c: char) -> bool {
    char::from_u32(key as u32).is_some_and(|k| k.eq_ignore_ascii_case(&c))
}

/// The universal "leave the match" keys.
pub fn is_quit(key: i32) -> bool {
    is_char(key, 'q') || key == KEY_CTRL_C
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chars_map_to_scalar_values() {
        assert_eq!(encode_key(KeyCode::Char('w')), Some('w' as i32));
        assert_eq!(encode_key(KeyCode::Char('Q')), Some('Q' as i32));
    }

    #[test]
    fn specials_sit_above_unicode() {
        for key in [KEY_UP, KEY_DOWN, KEY_LEFT, KEY_RIGHT, KEY_ENTER, KEY_ESC] {
            assert!(key > char::MAX as i32);
        }
        assert_eq!(encode_key(KeyCode::Up), Some(KEY_UP));
        assert_eq!(encode_key(KeyCode::F(1)), None);
    }

    #[test]
    fn quit_detection_covers_q_and_ctrl_c() {
        assert!(is_quit('q' as i32));
        assert!(is_quit('Q' as i32));
        assert!(is_quit(KEY_CTRL_C));
        assert!(!is_quit('w' as i32));
        assert!(!is_quit(KEY_UP));
    }
}
