//! Desktop mouse injection through `enigo`

use enigo::{Button, Coordinate, Direction, Enigo, Mouse, Settings};

use super::{InputError, PointerBackend};
use crate::game::ScreenPoint;

/// Left-button pointer backend for desktop sessions
pub struct EnigoPointer {
    enigo: Enigo,
}

impl EnigoPointer {
    /// Connect to the platform input system.
    ///
    /// The X11 backend sleeps between events by default; that delay is set to
    /// zero since it would be added to every press.
    pub fn new() -> Result<Self, InputError> {
        let settings = Settings {
            #[cfg(target_os = "linux")]
            linux_delay: 0,
            ..Default::default()
        };

        let enigo = Enigo::new(&settings).map_err(|e| InputError::Unavailable(e.to_string()))?;
        log::info!("Desktop pointer backend ready");

        Ok(Self { enigo })
    }
}

impl PointerBackend for EnigoPointer {
    fn mouse_down(&mut self, point: ScreenPoint) -> Result<(), InputError> {
        self.enigo
            .move_mouse(point.x, point.y, Coordinate::Abs)
            .map_err(|e| InputError::Injection(e.to_string()))?;
        self.enigo
            .button(Button::Left, Direction::Press)
            .map_err(|e| InputError::Injection(e.to_string()))
    }

    fn mouse_up(&mut self, _point: ScreenPoint) -> Result<(), InputError> {
        self.enigo
            .button(Button::Left, Direction::Release)
            .map_err(|e| InputError::Injection(e.to_string()))
    }
}
