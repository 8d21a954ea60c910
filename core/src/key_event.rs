//! Key events: X11 keysym numbering, modifier masks, and the textual
//! representation used by key bindings and simulated key sequences.

/// Common X11 keysyms the engine cares about. Printable ASCII keys use
/// their character value.
pub mod keysym {
    pub const XK_SPACE: i32 = 0x0020;
    pub const XK_BACKSPACE: i32 = 0xff08;
    pub const XK_TAB: i32 = 0xff09;
    pub const XK_RETURN: i32 = 0xff0d;
    pub const XK_ESCAPE: i32 = 0xff1b;
    pub const XK_HOME: i32 = 0xff50;
    pub const XK_LEFT: i32 = 0xff51;
    pub const XK_UP: i32 = 0xff52;
    pub const XK_RIGHT: i32 = 0xff53;
    pub const XK_DOWN: i32 = 0xff54;
    pub const XK_PAGE_UP: i32 = 0xff55;
    pub const XK_PAGE_DOWN: i32 = 0xff56;
    pub const XK_END: i32 = 0xff57;
    pub const XK_KP_DELETE: i32 = 0xff9f;
    pub const XK_DELETE: i32 = 0xffff;
}

pub const SHIFT_MASK: u32 = 1;
pub const CONTROL_MASK: u32 = 4;
pub const ALT_MASK: u32 = 8;
pub const RELEASE_MASK: u32 = 0x4000_0000;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyParseError {
    #[error("unknown key name: {0:?}")]
    UnknownKey(String),
    #[error("unknown modifier: {0:?}")]
    UnknownModifier(String),
    #[error("unterminated escape in key sequence")]
    UnterminatedEscape,
    #[error("empty key spec")]
    Empty,
}

fn keysym_by_name(name: &str) -> Option<i32> {
    use keysym::*;
    Some(match name {
        "space" => XK_SPACE,
        "BackSpace" => XK_BACKSPACE,
        "Tab" => XK_TAB,
        "Return" | "Enter" => XK_RETURN,
        "Escape" => XK_ESCAPE,
        "Home" => XK_HOME,
        "End" => XK_END,
        "Left" => XK_LEFT,
        "Right" => XK_RIGHT,
        "Up" => XK_UP,
        "Down" => XK_DOWN,
        "Page_Up" => XK_PAGE_UP,
        "Page_Down" => XK_PAGE_DOWN,
        "Delete" => XK_DELETE,
        "KP_Delete" => XK_KP_DELETE,
        _ => return None,
    })
}

fn name_by_keysym(keycode: i32) -> Option<&'static str> {
    use keysym::*;
    Some(match keycode {
        XK_SPACE => "space",
        XK_BACKSPACE => "BackSpace",
        XK_TAB => "Tab",
        XK_RETURN => "Return",
        XK_ESCAPE => "Escape",
        XK_HOME => "Home",
        XK_END => "End",
        XK_LEFT => "Left",
        XK_RIGHT => "Right",
        XK_UP => "Up",
        XK_DOWN => "Down",
        XK_PAGE_UP => "Page_Up",
        XK_PAGE_DOWN => "Page_Down",
        XK_DELETE => "Delete",
        XK_KP_DELETE => "KP_Delete",
        _ => None?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub keycode: i32,
    pub mask: u32,
}

impl KeyEvent {
    pub fn new(keycode: i32, mask: u32) -> Self {
        KeyEvent { keycode, mask }
    }

    pub fn shift(&self) -> bool {
        self.mask & SHIFT_MASK != 0
    }

    pub fn ctrl(&self) -> bool {
        self.mask & CONTROL_MASK != 0
    }

    pub fn alt(&self) -> bool {
        self.mask & ALT_MASK != 0
    }

    pub fn release(&self) -> bool {
        self.mask & RELEASE_MASK != 0
    }

    /// The printable character this key inserts, if it is a plain printable
    /// key press.
    pub fn printable_char(&self) -> Option<char> {
        if self.ctrl() || self.alt() || self.release() {
            return None;
        }
        if (0x20..0x7f).contains(&self.keycode) {
            char::from_u32(self.keycode as u32)
        } else {
            None
        }
    }

    /// Parse a `"Modifier+...+key"` spec, e.g. `"a"`, `"Return"`,
    /// `"Control+grave"` style names are limited to the table above.
    pub fn parse(spec: &str) -> Result<KeyEvent, KeyParseError> {
        if spec.is_empty() {
            return Err(KeyParseError::Empty);
        }
        let mut mask = 0;
        let mut tokens: Vec<&str> = spec.split('+').collect();
        let key = tokens.pop().ok_or(KeyParseError::Empty)?;
        for modifier in tokens {
            mask |= match modifier {
                "Shift" => SHIFT_MASK,
                "Control" | "Ctrl" => CONTROL_MASK,
                "Alt" => ALT_MASK,
                "Release" => RELEASE_MASK,
                other => return Err(KeyParseError::UnknownModifier(other.to_string())),
            };
        }
        let keycode = if key.chars().count() == 1 {
            let ch = key.chars().next().unwrap();
            if !ch.is_ascii() || ch.is_ascii_control() {
                return Err(KeyParseError::UnknownKey(key.to_string()));
            }
            ch as i32
        } else {
            keysym_by_name(key).ok_or_else(|| KeyParseError::UnknownKey(key.to_string()))?
        };
        Ok(KeyEvent::new(keycode, mask))
    }

    pub fn repr(&self) -> String {
        let mut out = String::new();
        if self.shift() {
            out.push_str("Shift+");
        }
        if self.ctrl() {
            out.push_str("Control+");
        }
        if self.alt() {
            out.push_str("Alt+");
        }
        if self.release() {
            out.push_str("Release+");
        }
        if let Some(name) = name_by_keysym(self.keycode) {
            out.push_str(name);
        } else if let Some(ch) = char::from_u32(self.keycode as u32)
            .filter(|c| c.is_ascii_graphic())
        {
            out.push(ch);
        } else {
            out.push_str(&format!("0x{:x}", self.keycode));
        }
        out
    }
}

/// Parse a simulated key sequence: printable characters, with
/// `{Name}` / `{Modifier+key}` escapes for everything else.
///
/// The whole string is parsed before any event is produced, so a malformed
/// sequence yields an error without a partial result.
pub fn parse_key_sequence(sequence: &str) -> Result<Vec<KeyEvent>, KeyParseError> {
    let mut events = Vec::new();
    let mut chars = sequence.chars();
    while let Some(ch) = chars.next() {
        if ch == '{' {
            let mut spec = String::new();
            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(c) => spec.push(c),
                    None => return Err(KeyParseError::UnterminatedEscape),
                }
            }
            events.push(KeyEvent::parse(&spec)?);
        } else if ch.is_ascii() && !ch.is_ascii_control() {
            events.push(KeyEvent::new(ch as i32, 0));
        } else {
            return Err(KeyParseError::UnknownKey(ch.to_string()));
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modifier_accessors_read_the_mask() {
        let key = KeyEvent::new('a' as i32, SHIFT_MASK | CONTROL_MASK);
        assert!(key.shift());
        assert!(key.ctrl());
        assert!(!key.alt());
        assert!(!key.release());
        assert!(key.printable_char().is_none());
        assert_eq!(KeyEvent::new('a' as i32, 0).printable_char(), Some('a'));
    }

    #[test]
    fn parse_and_repr_round_trip() {
        for spec in ["a", "Return", "Shift+Return", "Control+a", "space"] {
            let key = KeyEvent::parse(spec).unwrap();
            assert_eq!(key.repr(), spec);
        }
        assert_eq!(
            KeyEvent::parse("Return").unwrap().keycode,
            keysym::XK_RETURN
        );
        assert!(KeyEvent::parse("NoSuchKey").is_err());
        assert!(KeyEvent::parse("Hyper+a").is_err());
        assert!(KeyEvent::parse("").is_err());
    }

    #[test]
    fn key_sequences_mix_literals_and_escapes() {
        let events = parse_key_sequence("hao{space}").unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].keycode, 'h' as i32);
        assert_eq!(events[3].keycode, keysym::XK_SPACE);

        let events = parse_key_sequence("{Shift+Return}").unwrap();
        assert_eq!(events[0].keycode, keysym::XK_RETURN);
        assert!(events[0].shift());
    }

    #[test]
    fn malformed_sequences_produce_no_events() {
        assert_eq!(
            parse_key_sequence("ab{Return"),
            Err(KeyParseError::UnterminatedEscape)
        );
        assert!(parse_key_sequence("{Bogus}").is_err());
    }
}
