use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::geometry::Vec2;
use crate::signal::{ListenerResult, Signal};

/// Linear interpolation between two points over a fixed duration.
pub struct Tween {
    from: Vec2,
    to: Vec2,
    duration: Duration,
    elapsed: Cell<Duration>,
    finished: Cell<bool>,
    /// Receives the interpolated value every update, including the final one.
    pub on_update: Signal<Vec2>,
    pub on_complete: Signal<()>,
}

impl fmt::Debug for Tween {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tween")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("duration", &self.duration)
            .field("elapsed", &self.elapsed.get())
            .finish()
    }
}

impl Tween {
    fn new(from: Vec2, to: Vec2, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            elapsed: Cell::new(Duration::ZERO),
            finished: Cell::new(false),
            on_update: Signal::new(),
            on_complete: Signal::new(),
        }
    }

    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.get().as_secs_f32() / self.duration.as_secs_f32()).clamp(0.0, 1.0)
    }

    pub fn value(&self) -> Vec2 {
        self.from.lerp(self.to, self.progress())
    }

    pub fn is_finished(&self) -> bool {
        self.finished.get()
    }

    fn advance(&self, dt: Duration) -> ListenerResult {
        if self.finished.get() {
            return Ok(());
        }
        self.elapsed
            .set(self.elapsed.get().saturating_add(dt).min(self.duration));
        self.on_update.dispatch_with(self.value())?;
        if self.elapsed.get() >= self.duration {
            self.finished.set(true);
            self.on_complete.dispatch()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TweenManager {
    tweens: RefCell<Vec<Rc<Tween>>>,
}

impl TweenManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a running tween. Hook its signals before the next [`TweenManager::update`].
    pub fn create(&self, from: Vec2, to: Vec2, duration: Duration) -> Rc<Tween> {
        let tween = Rc::new(Tween::new(from, to, duration));
        self.tweens.borrow_mut().push(Rc::clone(&tween));
        debug!(duration_ms = duration.as_millis() as u64, "tween_created");
        tween
    }

    pub fn active_count(&self) -> usize {
        self.tweens.borrow().len()
    }

    pub fn update(&self, dt: Duration) -> ListenerResult {
        // Listeners may create tweens; those start on the next update.
        let snapshot: Vec<Rc<Tween>> = self.tweens.borrow().clone();
        for tween in &snapshot {
            tween.advance(dt)?;
        }
        self.tweens.borrow_mut().retain(|tween| !tween.is_finished());
        Ok(())
    }
}
