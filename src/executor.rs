//! Performs one directive against the live page.
//!
//! Execution is best-effort: a missing target, an unsupported kind or a failing page
//! operation is logged and the directive simply completes.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info, warn};
use rand::Rng;
use tokio::time::{Duration, sleep};

use crate::page::{CursorCommand, DomEvent, PagePort, Point};
use crate::types::{Directive, DirectiveKind, PilotError, Timings};

/// Anything that can carry out a directive and report completion by returning.
#[async_trait]
pub trait ActionRunner: Send + Sync + 'static {
    async fn run(&self, directive: Directive);
}

/// Phases of the simulated click.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickPhase {
    Idle,
    Moving,
    Pressing,
    Settling,
    Done,
}

impl ClickPhase {
    /// Phase that follows this one, and how long this one lasts.
    pub fn next(self, timings: &Timings) -> (ClickPhase, Duration) {
        match self {
            ClickPhase::Idle => (ClickPhase::Moving, timings.cursor_lead_in),
            ClickPhase::Moving => (ClickPhase::Pressing, timings.cursor_travel),
            ClickPhase::Pressing => (ClickPhase::Settling, timings.press_dwell),
            ClickPhase::Settling | ClickPhase::Done => (ClickPhase::Done, Duration::ZERO),
        }
    }
}

pub struct ActionExecutor<P: PagePort> {
    page: Arc<P>,
    timings: Timings,
}

impl<P: PagePort + 'static> ActionExecutor<P> {
    pub fn new(page: Arc<P>, timings: Timings) -> Self {
        Self { page, timings }
    }

    /// Executes `directive`; returns once its effects on the page are complete.
    pub async fn execute(&self, directive: &Directive) {
        info!("Executing {:?} on '{}'", directive.kind, directive.target);

        if directive.kind == DirectiveKind::Unsupported {
            warn!("Unsupported directive on '{}', skipping", directive.target);
            return;
        }

        let handle = match self.page.resolve(&directive.target).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                warn!("Element not found: {}", directive.target);
                return;
            }
            Err(e) => {
                warn!("Could not resolve '{}': {}", directive.target, e);
                return;
            }
        };

        self.highlight(&handle).await;

        let outcome = match directive.kind {
            DirectiveKind::Click => self.click(&handle).await,
            DirectiveKind::Type => {
                self.type_text(&handle, directive.value.as_deref().unwrap_or(""))
                    .await
            }
            DirectiveKind::Unsupported => Ok(()),
        };

        if let Err(e) = outcome {
            warn!("{:?} on '{}' failed: {}", directive.kind, directive.target, e);
        }
    }

    /// Highlights the element and schedules the revert.
    async fn highlight(&self, handle: &P::Handle) {
        if let Err(e) = self.page.set_highlight(handle, true).await {
            debug!("Highlight failed: {}", e);
            return;
        }
        let page = Arc::clone(&self.page);
        let handle = handle.clone();
        let duration = self.timings.highlight;
        tokio::spawn(async move {
            sleep(duration).await;
            if let Err(e) = page.set_highlight(&handle, false).await {
                debug!("Highlight revert failed: {}", e);
            }
        });
    }

    async fn click(&self, handle: &P::Handle) -> Result<(), PilotError> {
        let target = self.page.bounding_box(handle).await?.center();
        let start = self.page.viewport().await?.center();

        let mut phase = ClickPhase::Idle;
        let result = loop {
            if let Err(e) = self.enter(phase, handle, start, target).await {
                break Err(e);
            }
            let (next, hold) = phase.next(&self.timings);
            if phase == ClickPhase::Done {
                break Ok(());
            }
            if !hold.is_zero() {
                sleep(hold).await;
            }
            phase = next;
        };

        if result.is_err() {
            if let Err(e) = self.page.cursor(CursorCommand::Remove).await {
                debug!("Cursor cleanup failed: {}", e);
            }
        }
        result
    }

    async fn enter(
        &self,
        phase: ClickPhase,
        handle: &P::Handle,
        start: Point,
        target: Point,
    ) -> Result<(), PilotError> {
        debug!("Click phase {:?}", phase);
        match phase {
            ClickPhase::Idle => self.page.cursor(CursorCommand::Show(start)).await,
            ClickPhase::Moving => {
                self.page
                    .cursor(CursorCommand::MoveTo {
                        to: target,
                        over: self.timings.cursor_travel,
                    })
                    .await
            }
            ClickPhase::Pressing => {
                self.page.cursor(CursorCommand::Press).await?;
                for event in [DomEvent::PointerDown, DomEvent::PointerUp, DomEvent::Click] {
                    self.page.dispatch(handle, event).await?;
                }
                Ok(())
            }
            ClickPhase::Settling => self.page.cursor(CursorCommand::Remove).await,
            ClickPhase::Done => Ok(()),
        }
    }

    async fn type_text(&self, handle: &P::Handle, text: &str) -> Result<(), PilotError> {
        self.page.dispatch(handle, DomEvent::Focus).await?;

        let mut chars = text.chars().peekable();
        while let Some(ch) = chars.next() {
            let mut value = self.page.value(handle).await?;
            value.push(ch);
            self.page.set_value(handle, &value).await?;
            self.page.dispatch(handle, DomEvent::Input).await?;
            if chars.peek().is_some() {
                sleep(self.keystroke_delay()).await;
            }
        }

        self.page.dispatch(handle, DomEvent::Change).await?;
        self.page.dispatch(handle, DomEvent::Blur).await
    }

    fn keystroke_delay(&self) -> Duration {
        let min = self.timings.keystroke_min;
        let max = self.timings.keystroke_max;
        if max <= min {
            return min;
        }
        rand::thread_rng().gen_range(min..=max)
    }
}

#[async_trait]
impl<P: PagePort + 'static> ActionRunner for ActionExecutor<P> {
    async fn run(&self, directive: Directive) {
        self.execute(&directive).await;
    }
}
