use std::{
    process::{Child, Command, Stdio},
    str::FromStr,
};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::Commands;
use crate::tracker::Axis;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("uinput error: {0}")]
    Uinput(#[from] uinput::Error),

    #[error("failed to run `{command}`: {source}")]
    Command {
        command: String,
        source: std::io::Error,
    },

    #[error("unknown mouse button: {0}")]
    UnknownButton(String),

    #[error("unsupported key: {0:?}")]
    UnsupportedKey(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl FromStr for MouseButton {
    type Err = ActionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            other => Err(ActionError::UnknownButton(other.to_string())),
        }
    }
}

/// OS-level effects. Calls are fire-and-forget; nothing waits for the desktop
/// to confirm them.
pub trait ActionSink {
    /// Move the pointer to an absolute screen position.
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), ActionError>;
    fn press(&mut self, button: MouseButton) -> Result<(), ActionError>;
    fn release(&mut self, button: MouseButton) -> Result<(), ActionError>;
    fn click(&mut self, button: MouseButton) -> Result<(), ActionError>;
    fn double_click(&mut self) -> Result<(), ActionError>;
    /// Positive steps scroll up / right.
    fn scroll(&mut self, axis: Axis, steps: i32) -> Result<(), ActionError>;
    fn set_volume(&mut self, level: f32) -> Result<(), ActionError>;
    fn set_brightness(&mut self, level: f32) -> Result<(), ActionError>;
    fn send_key(&mut self, key: char) -> Result<(), ActionError>;
    fn send_backspace(&mut self) -> Result<(), ActionError>;
    fn send_enter(&mut self) -> Result<(), ActionError>;
}

pub struct UinputSink {
    linux: Option<Box<LinuxUinput>>,
    commands: Commands,
    /// Last absolute position handed to `move_cursor`.
    cursor: Option<(i32, i32)>,
    children: Vec<Child>,
}

impl UinputSink {
    pub fn new(commands: Commands) -> Result<Self, ActionError> {
        let dev = LinuxUinput::create()?;
        Ok(Self {
            linux: Some(Box::new(dev)),
            commands,
            cursor: None,
            children: Vec::new(),
        })
    }

    pub fn noop(commands: Commands) -> Self {
        warn!("uinput not available; running in NO-OP mode");
        Self {
            linux: None,
            commands,
            cursor: None,
            children: Vec::new(),
        }
    }

    /// Open uinput, falling back to a sink that only runs commands.
    pub fn open_or_noop(commands: Commands) -> Self {
        match Self::new(commands.clone()) {
            Ok(s) => s,
            Err(e) => {
                warn!("uinput: {e}");
                Self::noop(commands)
            }
        }
    }

    pub fn set_commands(&mut self, commands: Commands) {
        self.commands = commands;
    }

    fn run_template(
        &mut self,
        what: &str,
        template: Option<String>,
        level: f32,
    ) -> Result<(), ActionError> {
        self.children.retain_mut(|c| matches!(c.try_wait(), Ok(None)));

        let Some(template) = template else {
            debug!("{what}: no command configured, level {level:.2} dropped");
            return Ok(());
        };
        let line = template
            .replace("{percent}", &format!("{}", (level * 100.0).round() as i32))
            .replace("{level}", &format!("{level:.2}"));
        let mut parts = line.split_whitespace();
        let Some(program) = parts.next() else {
            return Ok(());
        };
        let child = Command::new(program)
            .args(parts)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .map_err(|source| ActionError::Command {
                command: line.clone(),
                source,
            })?;
        debug!("{what}: spawned `{line}`");
        self.children.push(child);
        Ok(())
    }
}

impl ActionSink for UinputSink {
    fn move_cursor(&mut self, x: i32, y: i32) -> Result<(), ActionError> {
        let Some((px, py)) = self.cursor.replace((x, y)) else {
            return Ok(());
        };
        if let Some(dev) = self.linux.as_mut() {
            dev.move_rel(x - px, y - py)?;
        }
        Ok(())
    }

    fn press(&mut self, button: MouseButton) -> Result<(), ActionError> {
        if let Some(dev) = self.linux.as_mut() {
            dev.button(button, 1)?;
        }
        Ok(())
    }

    fn release(&mut self, button: MouseButton) -> Result<(), ActionError> {
        if let Some(dev) = self.linux.as_mut() {
            dev.button(button, 0)?;
        }
        Ok(())
    }

    fn click(&mut self, button: MouseButton) -> Result<(), ActionError> {
        self.press(button)?;
        self.release(button)
    }

    fn double_click(&mut self) -> Result<(), ActionError> {
        self.click(MouseButton::Left)?;
        self.click(MouseButton::Left)
    }

    fn scroll(&mut self, axis: Axis, steps: i32) -> Result<(), ActionError> {
        if let Some(dev) = self.linux.as_mut() {
            dev.scroll(axis, steps)?;
        }
        Ok(())
    }

    fn set_volume(&mut self, level: f32) -> Result<(), ActionError> {
        let t = self.commands.volume.clone();
        self.run_template("volume", t, level)
    }

    fn set_brightness(&mut self, level: f32) -> Result<(), ActionError> {
        let t = self.commands.brightness.clone();
        self.run_template("brightness", t, level)
    }

    fn send_key(&mut self, key: char) -> Result<(), ActionError> {
        let k = map_key(key)?;
        if let Some(dev) = self.linux.as_mut() {
            dev.tap(k)?;
        }
        Ok(())
    }

    fn send_backspace(&mut self) -> Result<(), ActionError> {
        if let Some(dev) = self.linux.as_mut() {
            dev.tap(uinput::event::keyboard::Key::BackSpace)?;
        }
        Ok(())
    }

    fn send_enter(&mut self) -> Result<(), ActionError> {
        if let Some(dev) = self.linux.as_mut() {
            dev.tap(uinput::event::keyboard::Key::Enter)?;
        }
        Ok(())
    }
}

fn map_key(c: char) -> Result<uinput::event::keyboard::Key, ActionError> {
    use uinput::event::keyboard::Key as K;
    let k = match c.to_ascii_lowercase() {
        'a' => K::A,
        'b' => K::B,
        'c' => K::C,
        'd' => K::D,
        'e' => K::E,
        'f' => K::F,
        'g' => K::G,
        'h' => K::H,
        'i' => K::I,
        'j' => K::J,
        'k' => K::K,
        'l' => K::L,
        'm' => K::M,
        'n' => K::N,
        'o' => K::O,
        'p' => K::P,
        'q' => K::Q,
        'r' => K::R,
        's' => K::S,
        't' => K::T,
        'u' => K::U,
        'v' => K::V,
        'w' => K::W,
        'x' => K::X,
        'y' => K::Y,
        'z' => K::Z,
        ' ' => K::Space,
        other => return Err(ActionError::UnsupportedKey(other)),
    };
    Ok(k)
}

struct LinuxUinput {
    dev: uinput::device::Device,
}

impl LinuxUinput {
    fn create() -> Result<Self, ActionError> {
        use uinput::event::{controller::Mouse, relative};

        let dev = uinput::default()?
            .name("Handctl Virtual Input")?
            // relative axes + wheel
            .event(relative::Position::X)?
            .event(relative::Position::Y)?
            .event(relative::Wheel::Vertical)?
            .event(relative::Wheel::Horizontal)?
            // mouse buttons
            .event(Mouse::Left)?
            .event(Mouse::Right)?
            .event(Mouse::Middle)?
            // the overlay types letters, space, backspace, enter
            .event(uinput::event::Keyboard::All)?
            .create()?;

        info!("uinput: created virtual device");
        Ok(Self { dev })
    }

    fn sync(&mut self) -> Result<(), ActionError> {
        self.dev.synchronize()?;
        Ok(())
    }

    fn tap(&mut self, key: uinput::event::keyboard::Key) -> Result<(), ActionError> {
        self.dev.send(key, 1)?;
        self.sync()?;
        self.dev.send(key, 0)?;
        self.sync()
    }

    fn button(&mut self, button: MouseButton, val: i32) -> Result<(), ActionError> {
        use uinput::event::controller::Mouse;
        let m = match button {
            MouseButton::Left => Mouse::Left,
            MouseButton::Right => Mouse::Right,
            MouseButton::Middle => Mouse::Middle,
        };
        self.dev.send(m, val)?;
        self.sync()
    }

    fn move_rel(&mut self, dx: i32, dy: i32) -> Result<(), ActionError> {
        use uinput::event::relative::Position;
        if dx == 0 && dy == 0 {
            return Ok(());
        }
        self.dev.send(Position::X, dx)?;
        self.dev.send(Position::Y, dy)?;
        self.sync()
    }

    fn scroll(&mut self, axis: Axis, steps: i32) -> Result<(), ActionError> {
        use uinput::event::relative::Wheel;
        let wheel = match axis {
            Axis::Vertical => Wheel::Vertical,
            Axis::Horizontal => Wheel::Horizontal,
        };
        self.dev.send(wheel, steps)?;
        self.sync()
    }
}
