//! Continuous capture → OCR → group → translate loop.
//!
//! Each tick captures the selected rectangle, recognizes words, groups them into paragraph
//! regions and asks the change detector whether the text moved since the last translation.
//! Only changed text is sent to the translator; text disappearing yields one empty frame.
//! Capture and OCR run on the blocking pool, translation is async I/O, and the sleep between
//! ticks adapts to how long the tick took (never below the configured floor).
//!
//! At most one continuous session runs at a time. Starting a new one stops the previous
//! worker first; `stop` waits for the worker up to a timeout and then detaches it. A
//! cancelled worker can never deliver another frame because delivery and cancellation share
//! a per-session lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbaImage;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::cancellation::{SessionGeneration, SessionGuard};
use crate::capture::{CaptureError, CommandCapture, Rectangle, ScreenCapturer};
use crate::change::{Change, ChangeDetector};
use crate::config::{AppConfig, BackendKind, PipelineSettings};
use crate::frame::{CaptureFrame, FrameSink};
use crate::grouping::{RegionGrouper, TextRegion};
use crate::metrics::{metric_names, MetricsRegistry};
use crate::ocr::{TesseractEngine, TextRecognizer};
use crate::state_machine::{PipelineState, StateMachine, TransitionError};
use crate::translate::cache::TranslationCache;
use crate::translate::{
    BatchStatus, DeepSeekClient, GoogleTranslator, TranslateError, TranslationBackend,
    TranslationService,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    State(#[from] TransitionError),
    #[error("pipeline worker failed: {0}")]
    Worker(String),
    #[error("cancelled")]
    Cancelled,
}

/// The external collaborators a pipeline drives.
#[derive(Clone)]
pub struct PipelineComponents {
    pub capturer: Arc<dyn ScreenCapturer>,
    pub recognizer: Arc<dyn TextRecognizer>,
    pub translator: Arc<TranslationService>,
}

impl PipelineComponents {
    /// Command-line capture, tesseract OCR and the configured translation backend.
    pub fn from_config(config: &AppConfig) -> Result<Self, TranslateError> {
        let t = &config.translate;
        let backend: Arc<dyn TranslationBackend> = match t.backend {
            BackendKind::Google => Arc::new(GoogleTranslator::new(t.timeout())?),
            BackendKind::Deepseek => {
                Arc::new(DeepSeekClient::from_env(&t.deepseek_base_url, t.timeout())?)
            }
        };
        let cache = Arc::new(TranslationCache::new(t.cache_capacity, t.cache_ttl()));
        let translator = TranslationService::new(backend, &t.source_lang, &t.target_lang)
            .with_cache(cache);

        Ok(Self {
            capturer: Arc::new(CommandCapture::new()),
            recognizer: Arc::new(TesseractEngine::new(
                &config.ocr.tesseract_cmd,
                &config.ocr.language,
                config.ocr.psm,
            )),
            translator: Arc::new(translator),
        })
    }
}

/// Everything a worker needs, shared between the continuous and single-shot paths.
struct PipelineContext {
    components: PipelineComponents,
    grouper: RegionGrouper,
    settings: PipelineSettings,
    metrics: Arc<MetricsRegistry>,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickOutcome {
    Translated,
    Cleared,
    Unchanged,
    Failed,
    Cancelled,
}

#[derive(Debug, Default)]
struct SessionSummary {
    ticks: u64,
    frames: u64,
}

impl PipelineContext {
    /// Capture, recognize and group. Recognition failures count as "no text".
    async fn capture_and_group(
        &self,
        rect: Rectangle,
        guard: &SessionGuard,
    ) -> Result<(Arc<RgbaImage>, Vec<TextRegion>), PipelineError> {
        let timer = self.metrics.timer(metric_names::CAPTURE_DONE);
        let capturer = Arc::clone(&self.components.capturer);
        let image = tokio::task::spawn_blocking(move || capturer.capture(&rect))
            .await
            .map_err(|e| PipelineError::Worker(format!("capture task: {e}")))??;
        timer.stop();
        let image = Arc::new(image);

        if guard.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let timer = self.metrics.timer(metric_names::OCR_DONE);
        let recognizer = Arc::clone(&self.components.recognizer);
        let ocr_image = Arc::clone(&image);
        let words = tokio::task::spawn_blocking(move || recognizer.recognize(&ocr_image))
            .await
            .map_err(|e| PipelineError::Worker(format!("ocr task: {e}")))?;
        timer.stop();

        let words = match words {
            Ok(words) => words,
            Err(e) => {
                warn!(error = %e, "recognition failed, treating as no text");
                Vec::new()
            }
        };

        if guard.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let regions = self.grouper.group(&words);
        debug!(words = words.len(), regions = regions.len(), "grouped");
        Ok((image, regions))
    }

    /// Translate all regions in one batch and write results back by index.
    async fn translate_regions(&self, regions: &mut [TextRegion]) -> BatchStatus {
        let inputs: Vec<String> = regions.iter().map(|r| r.original_text.clone()).collect();
        let timer = self.metrics.timer(metric_names::TRANSLATE_DONE);
        let batch = self.components.translator.translate_batch(&inputs).await;
        timer.stop();

        if batch.is_degraded() {
            self.metrics.increment(metric_names::TRANSLATIONS_DEGRADED);
        }
        for (region, text) in regions.iter_mut().zip(batch.texts) {
            region.translated_text = text;
        }
        batch.status
    }

    /// One continuous-mode tick.
    async fn tick(
        &self,
        rect: Rectangle,
        detector: &mut ChangeDetector,
        guard: &SessionGuard,
        sink: &dyn FrameSink,
    ) -> TickOutcome {
        let (image, mut regions) = match self.capture_and_group(rect, guard).await {
            Ok(v) => v,
            Err(PipelineError::Cancelled) => return TickOutcome::Cancelled,
            Err(e) => {
                warn!(error = %e, "tick abandoned");
                self.metrics.increment(metric_names::TICKS_FAILED);
                return TickOutcome::Failed;
            }
        };

        match detector.assess(&regions) {
            Change::Unchanged => {
                self.metrics.increment(metric_names::TICKS_UNCHANGED);
                TickOutcome::Unchanged
            }
            Change::Clear => {
                info!("text disappeared, clearing overlay");
                let frame = CaptureFrame {
                    rect,
                    image,
                    regions: Vec::new(),
                };
                if !guard.deliver_if_current(|| sink.deliver(frame)) {
                    return TickOutcome::Cancelled;
                }
                self.metrics.increment(metric_names::FRAMES_CLEARED);
                TickOutcome::Cleared
            }
            Change::Translate(fp) => {
                if guard.is_cancelled() {
                    return TickOutcome::Cancelled;
                }
                let status = self.translate_regions(&mut regions).await;
                if guard.is_cancelled() {
                    return TickOutcome::Cancelled;
                }
                // failed batches commit too; the fallback text stays until the screen changes
                detector.commit(fp);

                info!(regions = regions.len(), status = ?status, "text changed, delivering frame");
                let frame = CaptureFrame {
                    rect,
                    image,
                    regions,
                };
                if !guard.deliver_if_current(|| sink.deliver(frame)) {
                    return TickOutcome::Cancelled;
                }
                self.metrics.increment(metric_names::FRAMES_DELIVERED);
                TickOutcome::Translated
            }
        }
    }

    /// Session worker: tick until cancelled.
    async fn run_session(
        self: Arc<Self>,
        rect: Rectangle,
        interval: Duration,
        sink: Arc<dyn FrameSink>,
        guard: SessionGuard,
    ) -> SessionSummary {
        let mut detector = ChangeDetector::new();
        let mut summary = SessionSummary::default();
        let settings = PipelineSettings {
            interval_secs: interval.as_secs_f64(),
            ..self.settings.clone()
        };
        info!(interval_ms = interval.as_millis() as u64, "session started");

        loop {
            if guard.is_cancelled() {
                break;
            }
            let tick_start = Instant::now();
            self.metrics.increment(metric_names::TICKS);
            summary.ticks += 1;

            match self.tick(rect, &mut detector, &guard, sink.as_ref()).await {
                TickOutcome::Cancelled => break,
                TickOutcome::Translated | TickOutcome::Cleared => summary.frames += 1,
                TickOutcome::Unchanged | TickOutcome::Failed => {}
            }

            let elapsed = tick_start.elapsed();
            self.metrics.record(metric_names::TICK_DONE, elapsed);

            let pause = settings.sleep_after(elapsed);
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = guard.token().cancelled() => break,
            }
        }

        info!(ticks = summary.ticks, frames = summary.frames, "session stopped");
        summary
    }

    /// Single-shot: one capture, one translation, no change detection.
    async fn run_once(
        &self,
        rect: Rectangle,
        guard: &SessionGuard,
    ) -> Result<CaptureFrame, PipelineError> {
        let (image, mut regions) = self.capture_and_group(rect, guard).await?;
        if regions.is_empty() {
            info!("no text detected in region");
        } else {
            self.translate_regions(&mut regions).await;
        }
        Ok(CaptureFrame {
            rect,
            image,
            regions,
        })
    }
}

struct ActiveSession {
    id: Uuid,
    rect: Rectangle,
    guard: SessionGuard,
    handle: JoinHandle<SessionSummary>,
}

/// Owns the continuous session and its lifecycle.
pub struct ContinuousPipeline {
    ctx: Arc<PipelineContext>,
    state: StateMachine,
    generations: SessionGeneration,
    active: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl ContinuousPipeline {
    pub fn new(components: PipelineComponents, settings: PipelineSettings) -> Self {
        Self::with_metrics(components, settings, Arc::new(MetricsRegistry::new()))
    }

    pub fn with_metrics(
        components: PipelineComponents,
        settings: PipelineSettings,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            ctx: Arc::new(PipelineContext {
                components,
                grouper: RegionGrouper::new(settings.min_confidence),
                settings,
                metrics,
            }),
            state: StateMachine::new(),
            generations: SessionGeneration::new(),
            active: tokio::sync::Mutex::new(None),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> tokio::sync::watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.ctx.metrics
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.ctx.settings
    }

    /// Id and rectangle of the running session, if any.
    pub async fn active_session(&self) -> Option<(Uuid, Rectangle)> {
        self.active.lock().await.as_ref().map(|s| (s.id, s.rect))
    }

    /// Start a continuous session on `rect`, replacing any running one.
    pub async fn start<S: FrameSink>(
        &self,
        rect: Rectangle,
        sink: S,
        interval: Duration,
    ) -> Result<Uuid, PipelineError> {
        if rect.is_empty() {
            return Err(CaptureError::InvalidRegion(rect).into());
        }

        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            info!(previous = %previous.id, "replacing running session");
            self.shutdown(previous).await;
        }

        let guard = self.generations.cancel_and_advance();
        self.state.transition(PipelineState::Running)?;

        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id, region = %rect, generation = guard.generation());
        let handle = tokio::spawn(
            Arc::clone(&self.ctx)
                .run_session(rect, interval, Arc::new(sink), guard.clone())
                .instrument(span),
        );

        *active = Some(ActiveSession {
            id,
            rect,
            guard,
            handle,
        });
        Ok(id)
    }

    /// Start from a raw user selection with the configured interval. Selections not larger
    /// than `min_selection_px` in both dimensions are ignored and return `None`.
    pub async fn start_selection<S: FrameSink>(
        &self,
        x: i32,
        y: i32,
        width: i32,
        height: i32,
        sink: S,
    ) -> Result<Option<Uuid>, PipelineError> {
        let Some(rect) =
            Rectangle::from_selection(x, y, width, height, self.ctx.settings.min_selection_px)
        else {
            debug!(x, y, width, height, "selection too small, ignored");
            return Ok(None);
        };
        let interval = self.ctx.settings.interval();
        self.start(rect, sink, interval).await.map(Some)
    }

    /// Stop the running session. Returns false if nothing was running.
    pub async fn stop(&self) -> bool {
        let mut active = self.active.lock().await;
        match active.take() {
            Some(session) => {
                self.shutdown(session).await;
                true
            }
            None => {
                debug!("stop requested while idle");
                false
            }
        }
    }

    /// Cancel `session` and wait for its worker, bounded by the stop timeout.
    async fn shutdown(&self, session: ActiveSession) {
        if let Err(e) = self.state.transition(PipelineState::Stopping) {
            warn!(error = %e, "unexpected state while stopping");
        }

        session.guard.cancel();
        let timeout = self.ctx.settings.stop_timeout();
        match tokio::time::timeout(timeout, session.handle).await {
            Ok(Ok(summary)) => {
                debug!(session = %session.id, ticks = summary.ticks, "session worker joined");
            }
            Ok(Err(e)) => warn!(session = %session.id, error = %e, "session worker panicked"),
            Err(_) => warn!(
                session = %session.id,
                timeout_ms = timeout.as_millis() as u64,
                "session worker still busy after timeout, detaching"
            ),
        }

        if self.state.transition(PipelineState::Idle).is_err() {
            self.state.force_idle();
        }
    }

    /// Run one tick on `rect` on its own task and hand the result to `callback`.
    /// Independent of the continuous session.
    pub fn capture_once<F>(&self, rect: Rectangle, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(Result<CaptureFrame, PipelineError>) + Send + 'static,
    {
        let ctx = Arc::clone(&self.ctx);
        let span = info_span!("capture_once", region = %rect);
        tokio::spawn(
            async move {
                let result = if rect.is_empty() {
                    Err(CaptureError::InvalidRegion(rect).into())
                } else {
                    ctx.run_once(rect, &SessionGuard::detached()).await
                };
                if let Err(e) = &result {
                    warn!(error = %e, "single-shot capture failed");
                }
                callback(result);
            }
            .instrument(span),
        )
    }

    /// Single-shot translation of one piece of text, outside any capture.
    pub async fn translate_text(&self, text: &str) -> String {
        self.ctx.components.translator.translate_one(text).await
    }
}

impl Drop for ContinuousPipeline {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.try_lock() {
            if let Some(session) = active.take() {
                session.guard.cancel();
            }
        }
    }
}
