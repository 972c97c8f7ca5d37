//! Key combo grammar: `ctrl+shift+z`, `alt`, `f5`, `meta+[`

use std::collections::BTreeSet;
use std::fmt::{self, Display};
use std::str::FromStr;

/// Ordering follows the canonical display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Modifier {
    Ctrl,
    Shift,
    Alt,
    Meta,
}

impl Modifier {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "ctrl" | "control" => Some(Modifier::Ctrl),
            "shift" => Some(Modifier::Shift),
            "alt" | "option" => Some(Modifier::Alt),
            "meta" | "cmd" | "command" | "win" | "windows" | "super" => Some(Modifier::Meta),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Modifier::Ctrl => "ctrl",
            Modifier::Shift => "shift",
            Modifier::Alt => "alt",
            Modifier::Meta => "meta",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Uppercase letter, digit or punctuation character
    Char(char),
    Function(u8),
    Space,
    Tab,
    Enter,
    Escape,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    Up,
    Down,
    Left,
    Right,
    Plus,
    Minus,
    Equal,
}

const PUNCTUATION: &[char] = &[',', '.', '/', ';', '\'', '[', ']', '\\', '`', '-', '='];

impl Key {
    fn parse(token: &str) -> Option<Self> {
        let named = match token {
            "space" => Some(Key::Space),
            "tab" => Some(Key::Tab),
            "enter" | "return" => Some(Key::Enter),
            "esc" | "escape" => Some(Key::Escape),
            "backspace" => Some(Key::Backspace),
            "del" | "delete" => Some(Key::Delete),
            "insert" => Some(Key::Insert),
            "home" => Some(Key::Home),
            "end" => Some(Key::End),
            "pageup" => Some(Key::PageUp),
            "pagedown" => Some(Key::PageDown),
            "up" => Some(Key::Up),
            "down" => Some(Key::Down),
            "left" => Some(Key::Left),
            "right" => Some(Key::Right),
            "plus" => Some(Key::Plus),
            "minus" => Some(Key::Minus),
            "equal" => Some(Key::Equal),
            _ => None,
        };
        if named.is_some() {
            return named;
        }

        let mut chars = token.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if c.is_ascii_alphanumeric() {
                return Some(Key::Char(c.to_ascii_uppercase()));
            }
            if PUNCTUATION.contains(&c) {
                return Some(Key::Char(c));
            }
            return None;
        }

        let number = token.strip_prefix('f')?.parse::<u8>().ok()?;
        (1..=24).contains(&number).then_some(Key::Function(number))
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Key::Char(c) => return write!(f, "{}", c),
            Key::Function(n) => return write!(f, "F{}", n),
            Key::Space => "space",
            Key::Tab => "tab",
            Key::Enter => "enter",
            Key::Escape => "esc",
            Key::Backspace => "backspace",
            Key::Delete => "delete",
            Key::Insert => "insert",
            Key::Home => "home",
            Key::End => "end",
            Key::PageUp => "pageup",
            Key::PageDown => "pagedown",
            Key::Up => "up",
            Key::Down => "down",
            Key::Left => "left",
            Key::Right => "right",
            Key::Plus => "plus",
            Key::Minus => "minus",
            Key::Equal => "equal",
        };
        write!(f, "{}", name)
    }
}

/// Modifiers plus at most one base key
///
/// A modifier-only combo is valid and means "hold these modifiers".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyCombo {
    pub modifiers: BTreeSet<Modifier>,
    pub key: Option<Key>,
}

impl FromStr for KeyCombo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut modifiers = BTreeSet::new();
        let mut key = None;

        for raw in s.split('+') {
            let token = raw.trim().to_ascii_lowercase();
            if token.is_empty() {
                return Err("empty token (use 'plus' for the + key)".to_string());
            }
            if let Some(modifier) = Modifier::parse(&token) {
                modifiers.insert(modifier);
                continue;
            }
            let parsed = Key::parse(&token).ok_or_else(|| format!("unknown key '{}'", raw.trim()))?;
            if let Some(existing) = key {
                return Err(format!("more than one base key ({} and {})", existing, parsed));
            }
            key = Some(parsed);
        }

        Ok(Self { modifiers, key })
    }
}

impl Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.modifiers.iter().map(|m| m.name().to_string()).collect();
        if let Some(key) = self.key {
            parts.push(key.to_string());
        }
        write!(f, "{}", parts.join("+"))
    }
}
