//! Typed UI actions and the action-code grammar the decision provider speaks.
//!
//! ```text
//! click(x, y[, button="left"|"right"|"middle"][, clicks=N])
//! move_to(x, y)
//! drag(x1, y1, x2, y2)
//! type("text")
//! scroll(dx, dy)
//! hotkey("ctrl", "c")
//! ```
//!
//! Positive `dy` scrolls down, positive `dx` scrolls right. Strings are double- or
//! single-quoted with `\"`, `\'`, `\\` and `\n` escapes.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::perception::types::ScreenshotMeta;

const MAX_CLICKS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn as_str(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl FromStr for MouseButton {
    type Err = ScreenPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(ScreenPilotError::ActionParse(format!("unknown mouse button '{other}'"))),
        }
    }
}

/// Platform-neutral key name. Mapped onto the input backend's key codes at execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum KeyName {
    Control,
    Shift,
    Alt,
    Meta,
    Return,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    F(u8),
    Char(char),
}

impl FromStr for KeyName {
    type Err = ScreenPilotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "ctrl" | "control" => KeyName::Control,
            "shift" => KeyName::Shift,
            "alt" | "option" => KeyName::Alt,
            "cmd" | "command" | "meta" | "super" | "win" => KeyName::Meta,
            "enter" | "return" => KeyName::Return,
            "tab" => KeyName::Tab,
            "esc" | "escape" => KeyName::Escape,
            "backspace" => KeyName::Backspace,
            "delete" | "del" => KeyName::Delete,
            "space" => KeyName::Space,
            "up" => KeyName::Up,
            "down" => KeyName::Down,
            "left" => KeyName::Left,
            "right" => KeyName::Right,
            "home" => KeyName::Home,
            "end" => KeyName::End,
            "pageup" | "pgup" => KeyName::PageUp,
            "pagedown" | "pgdn" => KeyName::PageDown,
            _ => {
                let mut chars = lower.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => KeyName::Char(c),
                    (Some('f'), Some(_)) => match lower[1..].parse::<u8>() {
                        Ok(n @ 1..=12) => KeyName::F(n),
                        _ => return Err(ScreenPilotError::ActionParse(format!("unknown key '{s}'"))),
                    },
                    _ => return Err(ScreenPilotError::ActionParse(format!("unknown key '{s}'"))),
                }
            }
        };
        Ok(key)
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyName::Control => f.write_str("ctrl"),
            KeyName::Shift => f.write_str("shift"),
            KeyName::Alt => f.write_str("alt"),
            KeyName::Meta => f.write_str("meta"),
            KeyName::Return => f.write_str("enter"),
            KeyName::Tab => f.write_str("tab"),
            KeyName::Escape => f.write_str("esc"),
            KeyName::Backspace => f.write_str("backspace"),
            KeyName::Delete => f.write_str("delete"),
            KeyName::Space => f.write_str("space"),
            KeyName::Up => f.write_str("up"),
            KeyName::Down => f.write_str("down"),
            KeyName::Left => f.write_str("left"),
            KeyName::Right => f.write_str("right"),
            KeyName::Home => f.write_str("home"),
            KeyName::End => f.write_str("end"),
            KeyName::PageUp => f.write_str("pageup"),
            KeyName::PageDown => f.write_str("pagedown"),
            KeyName::F(n) => write!(f, "f{n}"),
            KeyName::Char(c) => write!(f, "{c}"),
        }
    }
}

impl From<KeyName> for String {
    fn from(key: KeyName) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for KeyName {
    type Error = ScreenPilotError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Click { x: i32, y: i32, button: MouseButton, clicks: u32 },
    MoveTo { x: i32, y: i32 },
    Drag { from_x: i32, from_y: i32, to_x: i32, to_y: i32 },
    TypeText { text: String },
    Scroll { dx: i32, dy: i32 },
    Hotkey { keys: Vec<KeyName> },
}

impl Action {
    /// Parse and validate one action-code string.
    pub fn parse(code: &str) -> ScreenPilotResult<Action> {
        let call = call_regex()
            .captures(code)
            .ok_or_else(|| ScreenPilotError::ActionParse(format!("not a call expression: {code}")))?;
        let name = call[1].to_ascii_lowercase();
        let mut args = CallArgs::tokenize(&call[2])?;

        let action = match name.as_str() {
            "click" => {
                let (x, y) = (args.int(0, "x")?, args.int(1, "y")?);
                let button = match args.named_str("button")? {
                    Some(b) => b.parse()?,
                    None => MouseButton::Left,
                };
                let clicks = match args.named_int("clicks")? {
                    Some(n) if (1..=MAX_CLICKS as i64).contains(&n) => n as u32,
                    Some(n) => {
                        return Err(ScreenPilotError::ActionParse(format!(
                            "clicks must be 1..={MAX_CLICKS}, got {n}"
                        )))
                    }
                    None => 1,
                };
                args.expect_positional(2)?;
                Action::Click { x, y, button, clicks }
            }
            "move_to" => {
                let action = Action::MoveTo {
                    x: args.int(0, "x")?,
                    y: args.int(1, "y")?,
                };
                args.expect_positional(2)?;
                action
            }
            "drag" => {
                let action = Action::Drag {
                    from_x: args.int(0, "x1")?,
                    from_y: args.int(1, "y1")?,
                    to_x: args.int(2, "x2")?,
                    to_y: args.int(3, "y2")?,
                };
                args.expect_positional(4)?;
                action
            }
            "type" => {
                let text = args.string(0, "text")?;
                if text.is_empty() {
                    return Err(ScreenPilotError::ActionParse("type() needs non-empty text".into()));
                }
                args.expect_positional(1)?;
                Action::TypeText { text }
            }
            "scroll" => {
                let action = Action::Scroll {
                    dx: args.int(0, "dx")?,
                    dy: args.int(1, "dy")?,
                };
                args.expect_positional(2)?;
                action
            }
            "hotkey" => {
                if args.positional.is_empty() {
                    return Err(ScreenPilotError::ActionParse("hotkey() needs at least one key".into()));
                }
                let keys = (0..args.positional.len())
                    .map(|i| args.string(i, "key")?.parse())
                    .collect::<ScreenPilotResult<Vec<KeyName>>>()?;
                Action::Hotkey { keys }
            }
            other => {
                return Err(ScreenPilotError::ActionParse(format!("unknown action '{other}'")));
            }
        };
        args.expect_no_named()?;
        action.validate()?;
        Ok(action)
    }

    fn validate(&self) -> ScreenPilotResult<()> {
        let points = match self {
            Action::Click { x, y, .. } | Action::MoveTo { x, y } => vec![(*x, *y)],
            Action::Drag { from_x, from_y, to_x, to_y } => vec![(*from_x, *from_y), (*to_x, *to_y)],
            _ => Vec::new(),
        };
        if let Some((x, y)) = points.iter().find(|(x, y)| *x < 0 || *y < 0) {
            return Err(ScreenPilotError::ActionParse(format!(
                "negative screen coordinate ({x}, {y})"
            )));
        }
        Ok(())
    }

    /// Same action with every screen coordinate mapped from image space to physical
    /// pixels.
    pub fn to_physical(&self, meta: &ScreenshotMeta) -> Action {
        match self {
            Action::Click { x, y, button, clicks } => {
                let (x, y) = meta.to_physical(*x, *y);
                Action::Click { x, y, button: *button, clicks: *clicks }
            }
            Action::MoveTo { x, y } => {
                let (x, y) = meta.to_physical(*x, *y);
                Action::MoveTo { x, y }
            }
            Action::Drag { from_x, from_y, to_x, to_y } => {
                let (from_x, from_y) = meta.to_physical(*from_x, *from_y);
                let (to_x, to_y) = meta.to_physical(*to_x, *to_y);
                Action::Drag { from_x, from_y, to_x, to_y }
            }
            other => other.clone(),
        }
    }

    /// Human-readable summary shown next to the action code when asking permission.
    pub fn describe(&self) -> String {
        match self {
            Action::Click { x, y, button, clicks } => {
                let times = match clicks {
                    1 => "click",
                    2 => "double-click",
                    _ => "triple-click",
                };
                format!("{} {times} at ({x}, {y})", button.as_str())
            }
            Action::MoveTo { x, y } => format!("move the pointer to ({x}, {y})"),
            Action::Drag { from_x, from_y, to_x, to_y } => {
                format!("drag from ({from_x}, {from_y}) to ({to_x}, {to_y})")
            }
            Action::TypeText { text } => format!("type {:?}", text),
            Action::Scroll { dx, dy } => {
                let mut parts = Vec::new();
                if *dy != 0 {
                    parts.push(format!("{} by {}", if *dy > 0 { "down" } else { "up" }, dy.abs()));
                }
                if *dx != 0 {
                    parts.push(format!("{} by {}", if *dx > 0 { "right" } else { "left" }, dx.abs()));
                }
                if parts.is_empty() {
                    "scroll by zero".into()
                } else {
                    format!("scroll {}", parts.join(" and "))
                }
            }
            Action::Hotkey { keys } => {
                let combo: Vec<String> = keys.iter().map(KeyName::to_string).collect();
                format!("press {}", combo.join("+"))
            }
        }
    }
}

/// Canonical action code; parses back to the same action.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { x, y, button, clicks } => {
                write!(f, "click({x}, {y}")?;
                if *button != MouseButton::Left {
                    write!(f, ", button=\"{}\"", button.as_str())?;
                }
                if *clicks != 1 {
                    write!(f, ", clicks={clicks}")?;
                }
                f.write_str(")")
            }
            Action::MoveTo { x, y } => write!(f, "move_to({x}, {y})"),
            Action::Drag { from_x, from_y, to_x, to_y } => {
                write!(f, "drag({from_x}, {from_y}, {to_x}, {to_y})")
            }
            Action::TypeText { text } => write!(f, "type({})", quote(text)),
            Action::Scroll { dx, dy } => write!(f, "scroll({dx}, {dy})"),
            Action::Hotkey { keys } => {
                let keys: Vec<String> = keys.iter().map(|k| quote(&k.to_string())).collect();
                write!(f, "hotkey({})", keys.join(", "))
            }
        }
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)^\s*([A-Za-z_][A-Za-z0-9_]*)\s*\((.*)\)\s*;?\s*$")
            .unwrap_or_else(|e| panic!("action call regex is invalid: {e}"))
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgValue {
    Int(i64),
    Str(String),
}

#[derive(Debug, Default)]
struct CallArgs {
    positional: Vec<ArgValue>,
    named: Vec<(String, ArgValue)>,
}

impl CallArgs {
    fn tokenize(src: &str) -> ScreenPilotResult<CallArgs> {
        let mut args = CallArgs::default();
        let mut chars = src.chars().peekable();

        loop {
            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            if chars.peek().is_none() {
                break;
            }

            // Optional `name=` prefix.
            let mut name = None;
            if chars.peek().is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_ascii_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                if chars.next() != Some('=') {
                    return Err(ScreenPilotError::ActionParse(format!(
                        "bare identifier '{ident}' is not a value"
                    )));
                }
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                name = Some(ident);
            }

            let value = match chars.peek() {
                Some(&q @ ('"' | '\'')) => {
                    chars.next();
                    let mut s = String::new();
                    loop {
                        match chars.next() {
                            Some('\\') => match chars.next() {
                                Some('n') => s.push('\n'),
                                Some('t') => s.push('\t'),
                                Some(c) => s.push(c),
                                None => {
                                    return Err(ScreenPilotError::ActionParse("unterminated string".into()));
                                }
                            },
                            Some(c) if c == q => break,
                            Some(c) => s.push(c),
                            None => {
                                return Err(ScreenPilotError::ActionParse("unterminated string".into()));
                            }
                        }
                    }
                    ArgValue::Str(s)
                }
                Some(_) => {
                    let mut raw = String::new();
                    while let Some(&c) = chars.peek() {
                        if c == ',' || c.is_whitespace() {
                            break;
                        }
                        raw.push(c);
                        chars.next();
                    }
                    let n = raw.parse::<i64>().map_err(|_| {
                        ScreenPilotError::ActionParse(format!("expected integer or string, got '{raw}'"))
                    })?;
                    ArgValue::Int(n)
                }
                None => return Err(ScreenPilotError::ActionParse("missing argument value".into())),
            };

            match name {
                Some(name) => args.named.push((name, value)),
                None if args.named.is_empty() => args.positional.push(value),
                None => {
                    return Err(ScreenPilotError::ActionParse(
                        "positional argument after named argument".into(),
                    ))
                }
            }

            while chars.peek().is_some_and(|c| c.is_whitespace()) {
                chars.next();
            }
            match chars.next() {
                Some(',') | None => {}
                Some(c) => {
                    return Err(ScreenPilotError::ActionParse(format!("unexpected '{c}' in arguments")));
                }
            }
        }
        Ok(args)
    }

    fn int(&self, idx: usize, what: &str) -> ScreenPilotResult<i32> {
        match self.positional.get(idx) {
            Some(ArgValue::Int(n)) => i32::try_from(*n)
                .map_err(|_| ScreenPilotError::ActionParse(format!("{what} out of range: {n}"))),
            Some(ArgValue::Str(_)) => Err(ScreenPilotError::ActionParse(format!("{what} must be an integer"))),
            None => Err(ScreenPilotError::ActionParse(format!("missing {what}"))),
        }
    }

    fn string(&self, idx: usize, what: &str) -> ScreenPilotResult<String> {
        match self.positional.get(idx) {
            Some(ArgValue::Str(s)) => Ok(s.clone()),
            Some(ArgValue::Int(_)) => Err(ScreenPilotError::ActionParse(format!("{what} must be a string"))),
            None => Err(ScreenPilotError::ActionParse(format!("missing {what}"))),
        }
    }

    fn take_named(&mut self, key: &str) -> Option<ArgValue> {
        let idx = self.named.iter().position(|(k, _)| k == key)?;
        Some(self.named.remove(idx).1)
    }

    fn named_str(&mut self, key: &str) -> ScreenPilotResult<Option<String>> {
        match self.take_named(key) {
            Some(ArgValue::Str(s)) => Ok(Some(s)),
            Some(ArgValue::Int(_)) => Err(ScreenPilotError::ActionParse(format!("{key} must be a string"))),
            None => Ok(None),
        }
    }

    fn named_int(&mut self, key: &str) -> ScreenPilotResult<Option<i64>> {
        match self.take_named(key) {
            Some(ArgValue::Int(n)) => Ok(Some(n)),
            Some(ArgValue::Str(_)) => Err(ScreenPilotError::ActionParse(format!("{key} must be an integer"))),
            None => Ok(None),
        }
    }

    fn expect_positional(&self, count: usize) -> ScreenPilotResult<()> {
        if self.positional.len() > count {
            return Err(ScreenPilotError::ActionParse(format!(
                "expected {count} positional arguments, got {}",
                self.positional.len()
            )));
        }
        Ok(())
    }

    fn expect_no_named(&self) -> ScreenPilotResult<()> {
        match self.named.first() {
            Some((k, _)) => Err(ScreenPilotError::ActionParse(format!("unexpected argument '{k}'"))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_click() {
        assert_eq!(
            Action::parse("click(100, 200)").expect("parse"),
            Action::Click { x: 100, y: 200, button: MouseButton::Left, clicks: 1 }
        );
    }

    #[test]
    fn parses_click_with_named_arguments() {
        assert_eq!(
            Action::parse("  click(5,6, button='right', clicks=2);").expect("parse"),
            Action::Click { x: 5, y: 6, button: MouseButton::Right, clicks: 2 }
        );
    }

    #[test]
    fn parses_type_with_escapes() {
        assert_eq!(
            Action::parse(r#"type("say \"hi\"\nthen, leave")"#).expect("parse"),
            Action::TypeText { text: "say \"hi\"\nthen, leave".into() }
        );
    }

    #[test]
    fn parses_hotkey_sequence() {
        assert_eq!(
            Action::parse(r#"hotkey("Ctrl", "shift", "t")"#).expect("parse"),
            Action::Hotkey { keys: vec![KeyName::Control, KeyName::Shift, KeyName::Char('t')] }
        );
        assert_eq!(
            Action::parse(r#"hotkey("f5")"#).expect("parse"),
            Action::Hotkey { keys: vec![KeyName::F(5)] }
        );
    }

    #[test]
    fn parses_scroll_and_drag() {
        assert_eq!(
            Action::parse("scroll(0, -3)").expect("parse"),
            Action::Scroll { dx: 0, dy: -3 }
        );
        assert_eq!(
            Action::parse("drag(1, 2, 30, 40)").expect("parse"),
            Action::Drag { from_x: 1, from_y: 2, to_x: 30, to_y: 40 }
        );
    }

    #[test]
    fn rejects_malformed_codes() {
        for code in [
            "click(1)",
            "click(1, 2, 3)",
            "click(-1, 2)",
            "click(1, 2, clicks=9)",
            "click(1, 2, colour=\"red\")",
            "type(\"\")",
            "type(\"open",
            "hotkey()",
            "hotkey(\"hyper\")",
            "launch(\"rm -rf /\")",
            "import os; os.system('x')",
            "scroll(down, 3)",
        ] {
            assert!(
                matches!(Action::parse(code), Err(ScreenPilotError::ActionParse(_))),
                "{code} should be rejected"
            );
        }
    }

    #[test]
    fn display_is_parseable_canonical_code() {
        let actions = [
            Action::Click { x: 3, y: 4, button: MouseButton::Middle, clicks: 3 },
            Action::TypeText { text: "a \"quoted\" \\ path".into() },
            Action::Hotkey { keys: vec![KeyName::Meta, KeyName::Space] },
        ];
        for action in actions {
            let code = action.to_string();
            assert_eq!(Action::parse(&code).expect("reparse"), action, "{code}");
        }
        assert_eq!(
            Action::Click { x: 1, y: 2, button: MouseButton::Left, clicks: 1 }.to_string(),
            "click(1, 2)"
        );
    }

    #[test]
    fn describe_reads_naturally() {
        assert_eq!(
            Action::parse("click(10, 20, clicks=2)").expect("parse").describe(),
            "left double-click at (10, 20)"
        );
        assert_eq!(
            Action::parse("scroll(0, 5)").expect("parse").describe(),
            "scroll down by 5"
        );
        assert_eq!(
            Action::parse("hotkey(\"ctrl\", \"c\")").expect("parse").describe(),
            "press ctrl+c"
        );
    }

    #[test]
    fn to_physical_maps_only_coordinates() {
        let meta = ScreenshotMeta {
            physical_width: 3000,
            physical_height: 1500,
            image_width: 2400,
            image_height: 1200,
        };
        assert_eq!(
            Action::parse("drag(0, 0, 2400, 1200)").expect("parse").to_physical(&meta),
            Action::Drag { from_x: 0, from_y: 0, to_x: 3000, to_y: 1500 }
        );
        let scroll = Action::Scroll { dx: 0, dy: 4 };
        assert_eq!(scroll.to_physical(&meta), scroll);
    }

    #[test]
    fn key_names_serialize_as_strings() {
        let action = Action::Hotkey { keys: vec![KeyName::Control, KeyName::Char('v')] };
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json, serde_json::json!({"type": "hotkey", "keys": ["ctrl", "v"]}));
    }
}
