// Physical input simulation through enigo.
use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};

use crate::errors::{ScreenPilotError, ScreenPilotResult};
use crate::executor::action::{Action, KeyName, MouseButton};
use crate::executor::dispatcher::ActionExecutor;

/// Dispatches real mouse and keyboard events to the desktop.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnigoExecutor;

#[async_trait]
impl ActionExecutor for EnigoExecutor {
    async fn execute(&self, action: &Action) -> ScreenPilotResult<()> {
        let action = action.clone();
        tokio::task::spawn_blocking(move || {
            let mut enigo = Enigo::new(&Settings::default())
                .map_err(|e| ScreenPilotError::Executor(format!("input backend unavailable: {e}")))?;
            perform(&mut enigo, &action)
        })
        .await
        .map_err(|e| ScreenPilotError::Executor(format!("join: {e}")))?
    }
}

fn perform(enigo: &mut Enigo, action: &Action) -> ScreenPilotResult<()> {
    tracing::debug!(action = %action, "dispatching input");
    match action {
        Action::Click { x, y, button, clicks } => {
            enigo.move_mouse(*x, *y, Coordinate::Abs).map_err(input_err)?;
            for _ in 0..*clicks {
                enigo.button(to_button(*button), Direction::Click).map_err(input_err)?;
            }
        }
        Action::MoveTo { x, y } => {
            enigo.move_mouse(*x, *y, Coordinate::Abs).map_err(input_err)?;
        }
        Action::Drag { from_x, from_y, to_x, to_y } => {
            enigo.move_mouse(*from_x, *from_y, Coordinate::Abs).map_err(input_err)?;
            enigo.button(Button::Left, Direction::Press).map_err(input_err)?;
            let moved = enigo.move_mouse(*to_x, *to_y, Coordinate::Abs).map_err(input_err);
            // Release even when the move failed so the button is not left held down.
            enigo.button(Button::Left, Direction::Release).map_err(input_err)?;
            moved?;
        }
        Action::TypeText { text } => {
            enigo.text(text).map_err(input_err)?;
        }
        Action::Scroll { dx, dy } => {
            if *dy != 0 {
                enigo.scroll(*dy, Axis::Vertical).map_err(input_err)?;
            }
            if *dx != 0 {
                enigo.scroll(*dx, Axis::Horizontal).map_err(input_err)?;
            }
        }
        Action::Hotkey { keys } => {
            let keys: Vec<Key> = keys.iter().copied().map(to_key).collect();
            let mut pressed = Vec::with_capacity(keys.len());
            let mut result = Ok(());
            for key in &keys {
                if let Err(e) = enigo.key(*key, Direction::Press) {
                    result = Err(input_err(e));
                    break;
                }
                pressed.push(*key);
            }
            for key in pressed.iter().rev() {
                enigo.key(*key, Direction::Release).map_err(input_err)?;
            }
            result?;
        }
    }
    Ok(())
}

fn input_err(e: enigo::InputError) -> ScreenPilotError {
    ScreenPilotError::Executor(e.to_string())
}

fn to_button(button: MouseButton) -> Button {
    match button {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
        MouseButton::Middle => Button::Middle,
    }
}

fn to_key(key: KeyName) -> Key {
    match key {
        KeyName::Control => Key::Control,
        KeyName::Shift => Key::Shift,
        KeyName::Alt => Key::Alt,
        KeyName::Meta => Key::Meta,
        KeyName::Return => Key::Return,
        KeyName::Tab => Key::Tab,
        KeyName::Escape => Key::Escape,
        KeyName::Backspace => Key::Backspace,
        KeyName::Delete => Key::Delete,
        KeyName::Space => Key::Space,
        KeyName::Up => Key::UpArrow,
        KeyName::Down => Key::DownArrow,
        KeyName::Left => Key::LeftArrow,
        KeyName::Right => Key::RightArrow,
        KeyName::Home => Key::Home,
        KeyName::End => Key::End,
        KeyName::PageUp => Key::PageUp,
        KeyName::PageDown => Key::PageDown,
        KeyName::F(n) => match n {
            1 => Key::F1,
            2 => Key::F2,
            3 => Key::F3,
            4 => Key::F4,
            5 => Key::F5,
            6 => Key::F6,
            7 => Key::F7,
            8 => Key::F8,
            9 => Key::F9,
            10 => Key::F10,
            11 => Key::F11,
            _ => Key::F12,
        },
        KeyName::Char(c) => Key::Unicode(c),
    }
}
