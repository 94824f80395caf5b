//! Shared state of the control server.

use crate::ui::facade::ControlFacade;

/// アプリケーション共有状態
///
/// Shared application state
pub struct AppState {
    /// ControlFacade（サーバー制御の境界）
    pub facade: ControlFacade,
}
