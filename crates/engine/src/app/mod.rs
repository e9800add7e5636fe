mod boot;
mod camera;
mod input;
mod loop_runner;
mod metrics;
mod rendering;
mod scene;
mod services;
mod tween;

pub use boot::{BootScene, SceneFactory};
pub use camera::Camera;
pub use input::{
    key_code_name, mouse_button_name, InputKey, InputManager, BUTTON_NAMES, KEY_STATE_PRIORITY,
};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{AssetLoadMetrics, LoopMetricsSnapshot, MetricsHandle};
pub use rendering::{
    fit_letterbox, window_to_virtual, Drawable, RenderBackend, Renderer, SoftwareBackend, Surface,
    Viewport, CLEAR_COLOR,
};
pub use scene::{Scene, SceneCameras, SceneCommand, SceneStack};
pub use services::Services;
pub use tween::{Tween, TweenManager};
