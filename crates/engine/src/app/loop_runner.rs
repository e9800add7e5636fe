use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::Error as PixelsError;
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, MouseButton, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use crate::assets::FsAssetSource;
use crate::geometry::Vec2;
use crate::signal::ListenerResult;
use crate::{resolve_app_paths, StartupError};

use super::input::{key_code_name, mouse_button_name, InputManager};
use super::metrics::{EngineCounters, MetricsAccumulator};
use super::rendering::{window_to_virtual, Renderer, SoftwareBackend, Viewport};
use super::scene::{Scene, SceneStack};
use super::services::Services;
use super::MetricsHandle;

pub const SLOW_FRAME_ENV_VAR: &str = "TESSERA_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Resolution scenes compose at; letterboxed into the window.
    pub virtual_width: u32,
    pub virtual_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
    pub manifest_url: String,
    pub map_url: String,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Tessera".to_string(),
            window_width: 800,
            window_height: 600,
            virtual_width: 800,
            virtual_height: 600,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
            manifest_url: "assets/assetlist.json".to_string(),
            map_url: "assets/maps/test.json".to_string(),
        }
    }
}

impl LoopConfig {
    pub fn virtual_viewport(&self) -> Viewport {
        Viewport {
            width: self.virtual_width.max(1),
            height: self.virtual_height.max(1),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(
    config: LoopConfig,
    services: Services,
    first_scene: Box<dyn Scene>,
) -> Result<(), AppError> {
    let metrics_handle = MetricsHandle::default();
    run_app_with_metrics(config, services, first_scene, metrics_handle)
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    services: Services,
    first_scene: Box<dyn Scene>,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let app_paths = resolve_app_paths()?;
    info!(
        root = %app_paths.root.display(),
        assets_dir = %app_paths.assets_dir.display(),
        "startup"
    );
    let asset_source = FsAssetSource::new(app_paths.root.clone());

    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let mut renderer = Renderer::new(Arc::clone(&window)).map_err(AppError::CreateRenderer)?;
    let virtual_size = config.virtual_viewport();
    let mut backend = SoftwareBackend::new(virtual_size);

    event_loop.set_control_flow(ControlFlow::Poll);

    let target_tps = config.target_tps.max(1);
    let max_frame_delta =
        normalize_non_zero_duration(config.max_frame_delta, Duration::from_millis(250));
    let max_ticks_per_frame = config.max_ticks_per_frame.max(1);
    let metrics_log_interval =
        normalize_non_zero_duration(config.metrics_log_interval, Duration::from_secs(1));
    let fixed_dt = Duration::from_secs_f64(1.0 / target_tps as f64);
    let fixed_dt_seconds = fixed_dt.as_secs_f32();
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    let effective_render_cap = normalize_render_fps_cap(config.max_render_fps);
    let render_frame_target = target_frame_duration(effective_render_cap);
    let mut input_collector = InputCollector::new(renderer.viewport(), virtual_size);

    let mut scenes = SceneStack::new();
    scenes.push(first_scene, &services);

    info!(
        target_tps,
        max_frame_delta_ms = max_frame_delta.as_millis() as u64,
        max_ticks_per_frame,
        metrics_log_interval_ms = metrics_log_interval.as_millis() as u64,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(effective_render_cap),
        virtual_width = virtual_size.width,
        virtual_height = virtual_size.height,
        "loop_config"
    );

    let mut accumulator = Duration::ZERO;
    let mut last_frame_instant = Instant::now();
    let mut last_present_instant = Instant::now();
    let mut metrics_accumulator = MetricsAccumulator::new(metrics_log_interval);
    let window_for_loop = Arc::clone(&window);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(new_size) => {
                        input_collector.set_window_size(new_size.width, new_size.height);
                        if let Err(error) = renderer.resize(new_size.width, new_size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::ScaleFactorChanged { .. } => {
                        let size = window_for_loop.inner_size();
                        input_collector.set_window_size(size.width, size.height);
                        if let Err(error) = renderer.resize(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::CursorMoved { position, .. } => {
                        input_collector.set_cursor_position_px(
                            &services.input,
                            position.x as f32,
                            position.y as f32,
                        );
                    }
                    WindowEvent::MouseInput { state, button, .. } => {
                        let result =
                            input_collector.handle_mouse_input(&services.input, button, state);
                        log_listener_failure("mouse", result);
                    }
                    WindowEvent::KeyboardInput { event, .. } => {
                        let result = input_collector.handle_physical_key(
                            &services.input,
                            event.physical_key,
                            event.state,
                            event.repeat,
                        );
                        log_listener_failure("keyboard", result);
                        if input_collector.quit_requested {
                            info!(reason = "escape_key", "shutdown_requested");
                            window_target.exit();
                        }
                    }
                    WindowEvent::RedrawRequested => {
                        if slow_frame_delay > Duration::ZERO {
                            thread::sleep(slow_frame_delay);
                        }

                        let now = Instant::now();
                        let raw_frame_dt = now.saturating_duration_since(last_frame_instant);
                        last_frame_instant = now;

                        // Loads settle on their own turn, ahead of the simulation steps.
                        match services.queue.pump(&asset_source) {
                            Ok(report) => metrics_accumulator.record_pump(report),
                            Err(error) => warn!(error = %error, "asset_listener_failed"),
                        }

                        let clamped_frame_dt = clamp_frame_delta(raw_frame_dt, max_frame_delta);
                        accumulator = accumulator.saturating_add(clamped_frame_dt);

                        let step_plan = plan_sim_steps(accumulator, fixed_dt, max_ticks_per_frame);
                        for _ in 0..step_plan.ticks_to_run {
                            log_listener_failure("tween", services.tweens.update(fixed_dt));
                            scenes.update(&services, fixed_dt_seconds);
                            metrics_accumulator.record_tick();
                        }
                        accumulator = step_plan.remaining_accumulator;

                        if step_plan.dropped_backlog > Duration::ZERO {
                            warn!(
                                dropped_backlog_ms = step_plan.dropped_backlog.as_millis() as u64,
                                max_ticks_per_frame, "sim_clamp_triggered"
                            );
                        }

                        if scenes.is_empty() {
                            info!(reason = "scene_stack_empty", "shutdown_requested");
                            window_target.exit();
                            return;
                        }

                        let elapsed_since_last_present =
                            Instant::now().saturating_duration_since(last_present_instant);
                        let cap_sleep =
                            compute_cap_sleep(elapsed_since_last_present, render_frame_target);
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        backend.begin_frame();
                        scenes.render(&mut backend);
                        if let Err(error) = renderer.present_frame(backend.frame()) {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                        }
                        last_present_instant = Instant::now();
                        metrics_accumulator.record_frame(
                            raw_frame_dt,
                            EngineCounters {
                                pending_loads: services.queue.pending_count(),
                                failed_loads: services.queue.failed_total(),
                                scene_depth: scenes.len(),
                                active_tweens: services.tweens.active_count(),
                            },
                        );

                        if let Some(snapshot) = metrics_accumulator.maybe_snapshot(now) {
                            metrics_handle.publish(snapshot);
                            info!(
                                fps = snapshot.fps,
                                tps = snapshot.tps,
                                frame_time_ms = snapshot.frame_time_ms,
                                worst_frame_ms = snapshot.worst_frame_ms,
                                pending_loads = snapshot.loads.pending,
                                completed_loads = snapshot.loads.completed,
                                failed_loads = snapshot.loads.failed_total,
                                active_tweens = snapshot.active_tweens,
                                scene = scenes.current_name().unwrap_or("none"),
                                scene_depth = snapshot.scene_depth,
                                "loop_metrics"
                            );
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => {
                window_for_loop.request_redraw();
            }
            Event::LoopExiting => {
                scenes.shutdown_all(&services);
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

fn log_listener_failure(origin: &'static str, result: ListenerResult) {
    if let Err(error) = result {
        warn!(origin, error = %error, "listener_failed");
    }
}

/// Routes window events into the [`InputManager`].
#[derive(Debug)]
struct InputCollector {
    quit_requested: bool,
    window: Viewport,
    virtual_size: Viewport,
}

impl InputCollector {
    fn new(window: Viewport, virtual_size: Viewport) -> Self {
        Self {
            quit_requested: false,
            window,
            virtual_size,
        }
    }

    fn set_window_size(&mut self, width: u32, height: u32) {
        self.window = Viewport { width, height };
    }

    fn set_cursor_position_px(&self, input: &InputManager, x: f32, y: f32) {
        let screen = Vec2::new(x, y);
        input.set_pointer(screen, window_to_virtual(screen, self.window, self.virtual_size));
    }

    fn handle_physical_key(
        &mut self,
        input: &InputManager,
        key: PhysicalKey,
        state: ElementState,
        repeat: bool,
    ) -> ListenerResult {
        let PhysicalKey::Code(code) = key else {
            return Ok(());
        };
        if code == KeyCode::Escape && state == ElementState::Pressed {
            self.quit_requested = true;
            return Ok(());
        }
        if repeat {
            return Ok(());
        }
        let Some(name) = key_code_name(code) else {
            return Ok(());
        };
        match state {
            ElementState::Pressed => input.press(name),
            ElementState::Released => input.release(name),
        }
    }

    fn handle_mouse_input(
        &self,
        input: &InputManager,
        button: MouseButton,
        state: ElementState,
    ) -> ListenerResult {
        let Some(name) = mouse_button_name(button) else {
            return Ok(());
        };
        match state {
            ElementState::Pressed => input.press(name),
            ElementState::Released => input.release(name),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(
    mut accumulator: Duration,
    fixed_dt: Duration,
    max_ticks_per_frame: u32,
) -> StepPlan {
    let mut ticks_to_run = 0u32;

    while accumulator >= fixed_dt && ticks_to_run < max_ticks_per_frame {
        accumulator = accumulator.saturating_sub(fixed_dt);
        ticks_to_run = ticks_to_run.saturating_add(1);
    }

    let dropped_backlog = if accumulator >= fixed_dt {
        std::mem::take(&mut accumulator)
    } else {
        Duration::ZERO
    };
    StepPlan {
        ticks_to_run,
        remaining_accumulator: accumulator,
        dropped_backlog,
    }
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn normalize_render_fps_cap(cap: Option<u32>) -> Option<u32> {
    cap.filter(|value| *value > 0)
}

fn target_frame_duration(max_render_fps: Option<u32>) -> Option<Duration> {
    max_render_fps.map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

fn format_render_cap(cap: Option<u32>) -> String {
    match cap {
        Some(value) => value.to_string(),
        None => "off".to_string(),
    }
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => match value.parse::<u64>() {
            Ok(ms) => Duration::from_millis(ms),
            Err(_) => {
                warn!(
                    env_var = SLOW_FRAME_ENV_VAR,
                    value = value.as_str(),
                    "invalid slow-frame env var value; falling back to config"
                );
                Duration::from_millis(config_slow_frame_ms)
            }
        },
        Err(env::VarError::NotPresent) => Duration::from_millis(config_slow_frame_ms),
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "unable to read slow-frame env var; falling back to config"
            );
            Duration::from_millis(config_slow_frame_ms)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use super::*;

    const WINDOW: Viewport = Viewport {
        width: 1600,
        height: 900,
    };
    const VIRTUAL: Viewport = Viewport {
        width: 800,
        height: 600,
    };

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let clamped = clamp_frame_delta(Duration::from_secs(2), Duration::from_millis(250));
        assert_eq!(clamped, Duration::from_millis(250));
    }

    #[test]
    fn plan_sim_steps_runs_expected_ticks_without_drop() {
        let fixed_dt = Duration::from_millis(10);
        let plan = plan_sim_steps(Duration::from_millis(35), fixed_dt, 5);

        assert_eq!(plan.ticks_to_run, 3);
        assert_eq!(plan.remaining_accumulator, Duration::from_millis(5));
        assert_eq!(plan.dropped_backlog, Duration::ZERO);
    }

    #[test]
    fn plan_sim_steps_drops_backlog_when_tick_cap_hit() {
        let fixed_dt = Duration::from_millis(10);
        let plan = plan_sim_steps(Duration::from_millis(100), fixed_dt, 3);

        assert_eq!(plan.ticks_to_run, 3);
        assert_eq!(plan.remaining_accumulator, Duration::ZERO);
        assert_eq!(plan.dropped_backlog, Duration::from_millis(70));
    }

    fn press_counter(input: &InputManager, name: &str) -> Rc<Cell<u32>> {
        let presses = Rc::new(Cell::new(0));
        let counter = Rc::clone(&presses);
        input
            .button(name)
            .expect("known button")
            .on_press
            .connect(crate::signal::DEFAULT_PRIORITY, move |_| {
                counter.set(counter.get() + 1);
                Ok(())
            });
        presses
    }

    #[test]
    fn key_repeats_do_not_press_again() {
        let input = InputManager::new();
        let presses = press_counter(&input, "W");
        let mut collector = InputCollector::new(WINDOW, VIRTUAL);
        let key = PhysicalKey::Code(KeyCode::KeyW);

        collector
            .handle_physical_key(&input, key, ElementState::Pressed, false)
            .expect("press");
        collector
            .handle_physical_key(&input, key, ElementState::Pressed, true)
            .expect("repeat");

        assert_eq!(presses.get(), 1);
        assert!(input.is_down("W"));

        collector
            .handle_physical_key(&input, key, ElementState::Released, false)
            .expect("release");
        assert!(!input.is_down("W"));
    }

    #[test]
    fn escape_requests_quit_without_touching_buttons() {
        let input = InputManager::new();
        let mut collector = InputCollector::new(WINDOW, VIRTUAL);

        collector
            .handle_physical_key(
                &input,
                PhysicalKey::Code(KeyCode::Escape),
                ElementState::Pressed,
                false,
            )
            .expect("escape");

        assert!(collector.quit_requested);
    }

    #[test]
    fn mouse_buttons_route_to_numbered_names() {
        let input = InputManager::new();
        let presses = press_counter(&input, "Mouse2");
        let collector = InputCollector::new(WINDOW, VIRTUAL);

        collector
            .handle_mouse_input(&input, MouseButton::Middle, ElementState::Pressed)
            .expect("press");

        assert_eq!(presses.get(), 1);
        assert!(input.is_down("Mouse2"));
    }

    #[test]
    fn cursor_maps_into_virtual_resolution_after_resize() {
        let input = InputManager::new();
        let mut collector = InputCollector::new(VIRTUAL, VIRTUAL);

        collector.set_cursor_position_px(&input, 400.0, 300.0);
        assert_eq!(input.pointer_game(), Vec2::new(400.0, 300.0));

        collector.set_window_size(WINDOW.width, WINDOW.height);
        collector.set_cursor_position_px(&input, 800.0, 450.0);

        assert_eq!(input.pointer_screen(), Vec2::new(800.0, 450.0));
        assert_eq!(input.pointer_game(), Vec2::new(400.0, 300.0));
    }

    #[test]
    fn target_frame_duration_for_60hz_is_expected() {
        let duration = target_frame_duration(Some(60)).expect("duration");
        assert!((duration.as_secs_f64() - (1.0 / 60.0)).abs() < 0.000_001);
    }

    #[test]
    fn compute_cap_sleep_only_when_under_budget() {
        let target = target_frame_duration(Some(60));

        assert_eq!(compute_cap_sleep(Duration::from_millis(20), target), Duration::ZERO);
        assert!(compute_cap_sleep(Duration::from_millis(5), target) > Duration::ZERO);
        assert_eq!(compute_cap_sleep(Duration::from_millis(5), None), Duration::ZERO);
    }

    #[test]
    fn normalize_render_fps_cap_disables_zero() {
        assert_eq!(normalize_render_fps_cap(Some(0)), None);
        assert_eq!(normalize_render_fps_cap(Some(60)), Some(60));
    }
}
