//! Pre-roll cache worker: the engine that keeps decoded frames resident
//! around the playhead.
//!
//! **Why**: the display loop must pull frames at the target rate without
//! ever waiting on synthesis. A dedicated thread walks a window of frame
//! numbers ahead of (or, in reverse, behind) the playhead and forces any
//! missing one through the reader, which deposits it in the cache store.
//!
//! **Used by**: the player UI. It writes playhead intent (`seek`), `speed`
//! and play state; it reads `is_ready()` to gate playback start.
//!
//! # Pass modes
//!
//! Every half-frame the worker runs one pass in one of three modes:
//! - **skip** — paused with the fill already done, or caching disabled:
//!   track the playhead and sleep.
//! - **paused fill** — first pass after a pause: widen the window to the
//!   cache byte budget and fill once in the direction of the last motion,
//!   so resuming is instant.
//! - **playing** — window of `max_frames_ahead` frames from the playhead,
//!   stepping by the playback speed.
//!
//! # Cancellation
//!
//! Cooperative. After every frame the pass re-checks the UI state (seek
//! out of window, speed change, stop) and the thread shutdown flag. No
//! lock is held across a `get_frame` call.

use log::{debug, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::reader::{FrameReader, ReaderError};
use crate::settings::Settings;

/// Assumed rate when a reader reports a non-positive or non-finite fps.
const FALLBACK_FPS: f64 = 30.0;

/// Hard ceiling on the paused-mode window, independent of settings. Tiny
/// frames against a huge byte budget must not produce an absurd window.
const ABSOLUTE_MAX_WINDOW: i64 = 1_000_000;

/// Poll interval while stopped (no pass work to pace the sleep).
const IDLE_SLEEP: Duration = Duration::from_millis(5);

/// How long `Drop` waits for the worker thread before detaching it.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Estimated resident size of one cached frame: RGBA image plus one
/// frame's worth of f32 audio.
///
/// The audio term uses `sample_rate / fps` rather than an exact per-frame
/// sample count; exact for integer rates, a close approximation otherwise.
pub fn bytes_per_frame(width: u32, height: u32, sample_rate: u32, channels: u32, fps: f64) -> u64 {
    let image = width as u64 * height as u64 * 4;
    if !fps.is_finite() || fps <= 0.0 {
        return image;
    }
    let audio = (sample_rate as f64 * channels as f64 / fps * 4.0).round() as u64;
    image + audio
}

/// Scalars shared between the UI thread and the worker. One mutex keeps
/// every cross-thread read coherent and makes the seek-plus-counter-reset
/// ordering guarantee trivial.
#[derive(Debug)]
struct PlayState {
    /// Playback speed: 0 paused, positive forward, negative reverse.
    speed: i32,
    /// Most recent non-zero speed; picks the fill direction while paused.
    last_speed: i32,
    is_playing: bool,
    /// Frame the worker considers at the playhead (1-based).
    current_display_frame: i64,
    /// Playhead the UI asked for (1-based).
    requested_display_frame: i64,
    /// Work-done counter: frames VISITED in the current window, cached or
    /// not. `is_ready` gates on this, not on residency.
    cached_frame_count: i64,
    min_frames_ahead: i64,
    max_frames_ahead: i64,
    /// One-shot latch: set on the first paused pass, cleared on resume,
    /// out-of-window seek, or external cache purge.
    should_pause_cache: bool,
    /// Most recently fetched frame (diagnostic only).
    last_cached_frame: Option<Arc<Frame>>,
}

impl PlayState {
    fn new() -> Self {
        Self {
            speed: 0,
            last_speed: 1,
            is_playing: false,
            current_display_frame: 1,
            requested_display_frame: 1,
            cached_frame_count: 0,
            min_frames_ahead: 4,
            max_frames_ahead: 8,
            should_pause_cache: false,
            last_cached_frame: None,
        }
    }

    /// Single clearing path for the pause latch.
    fn clear_pause_latch(&mut self) {
        self.should_pause_cache = false;
    }
}

struct Shared {
    reader: Arc<dyn FrameReader>,
    state: Mutex<PlayState>,
    should_exit: AtomicBool,
    snapshot_settings: Box<dyn Fn() -> Settings + Send + Sync>,
}

impl Shared {
    fn state(&self) -> std::sync::MutexGuard<'_, PlayState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Handle to the background pre-roll thread.
///
/// Dropping the handle signals the thread and joins it (bounded wait).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use preroll::{Fraction, PrerollWorker, ReaderInfo, SyntheticReader};
///
/// let info = ReaderInfo {
///     width: 640,
///     height: 360,
///     fps: Fraction::FPS_30,
///     sample_rate: 48000,
///     channels: 2,
///     video_length: 300,
/// };
/// let reader = Arc::new(SyntheticReader::new(info, 0));
/// let worker = PrerollWorker::new(reader);
///
/// worker.set_speed(1);
/// worker.seek(1);
/// worker.play();
/// while !worker.is_ready() {
///     std::thread::sleep(std::time::Duration::from_millis(5));
/// }
/// // Display loop can start pulling frames now.
/// ```
pub struct PrerollWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl PrerollWorker {
    /// Spawn the worker against the process-wide [`Settings`].
    pub fn new(reader: Arc<dyn FrameReader>) -> Self {
        Self::spawn(reader, Box::new(Settings::snapshot))
    }

    /// Spawn the worker with its own settings handle (tests, embedders).
    pub fn with_settings(reader: Arc<dyn FrameReader>, settings: Arc<RwLock<Settings>>) -> Self {
        let snapshot = move || settings.read().unwrap_or_else(|e| e.into_inner()).clone();
        Self::spawn(reader, Box::new(snapshot))
    }

    fn spawn(
        reader: Arc<dyn FrameReader>,
        snapshot_settings: Box<dyn Fn() -> Settings + Send + Sync>,
    ) -> Self {
        let shared = Arc::new(Shared {
            reader,
            state: Mutex::new(PlayState::new()),
            should_exit: AtomicBool::new(false),
            snapshot_settings,
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("preroll-cache".to_string())
            .spawn(move || run(&thread_shared))
            .expect("Failed to spawn preroll thread");

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Move the requested playhead. Non-blocking; the worker picks the new
    /// position up at its next checkpoint.
    pub fn seek(&self, frame: i64) {
        self.shared.state().requested_display_frame = frame.max(1);
    }

    /// Seek with pre-roll housekeeping.
    ///
    /// A jump whose predecessor frame is not resident is discontiguous:
    /// the sliding-window contents belong to another neighborhood, so the
    /// whole timeline cache is wiped rather than mixed. With
    /// `start_preroll`, an uncached target also resets the readiness
    /// counter so the UI waits for a fresh pre-roll.
    pub fn seek_with_preroll(&self, frame: i64, start_preroll: bool) {
        let frame = frame.max(1);
        let last_speed = self.shared.state().last_speed;
        let previous_frame = (frame - last_speed.signum() as i64).max(1);

        let cache = self.shared.reader.cache();
        if !cache.contains(previous_frame) {
            debug!(
                "discontiguous seek to {} (frame {} not resident), clearing cache",
                frame, previous_frame
            );
            match self.shared.reader.as_cache_clearable() {
                Some(clearable) => clearable.clear_all_cache(),
                None => cache.clear_all(),
            }
        }

        // Counter reset and seek land in the same critical section so a
        // later pass can never observe one without the other.
        let mut st = self.shared.state();
        if start_preroll && !cache.contains(frame) {
            st.cached_frame_count = 0;
            if st.speed == 0 {
                st.clear_pause_latch();
            }
        }
        st.requested_display_frame = frame;
    }

    /// Enable the caching loop. Idempotent.
    pub fn play(&self) {
        self.shared.state().is_playing = true;
    }

    /// Disable the caching loop; it goes idle within one pass. Idempotent.
    pub fn stop(&self) {
        self.shared.state().is_playing = false;
    }

    /// Pre-roll gate: has enough window work been done to start display?
    pub fn is_ready(&self) -> bool {
        let st = self.shared.state();
        st.cached_frame_count > st.min_frames_ahead
    }

    pub fn set_speed(&self, speed: i32) {
        self.shared.state().speed = speed;
    }

    pub fn speed(&self) -> i32 {
        self.shared.state().speed
    }

    pub fn last_speed(&self) -> i32 {
        self.shared.state().last_speed
    }

    pub fn is_playing(&self) -> bool {
        self.shared.state().is_playing
    }

    pub fn current_frame(&self) -> i64 {
        self.shared.state().current_display_frame
    }

    pub fn requested_frame(&self) -> i64 {
        self.shared.state().requested_display_frame
    }

    pub fn cached_frame_count(&self) -> i64 {
        self.shared.state().cached_frame_count
    }

    pub fn min_frames_ahead(&self) -> i64 {
        self.shared.state().min_frames_ahead
    }

    pub fn max_frames_ahead(&self) -> i64 {
        self.shared.state().max_frames_ahead
    }

    /// Most recently fetched frame, if any (diagnostic).
    pub fn last_cached_frame(&self) -> Option<Arc<Frame>> {
        self.shared.state().last_cached_frame.clone()
    }
}

impl Drop for PrerollWorker {
    fn drop(&mut self) {
        self.shared.should_exit.store(true, Ordering::SeqCst);

        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + SHUTDOWN_TIMEOUT;
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("preroll shutdown timeout reached, detaching thread");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }
    }
}

/// Thread body: idle until playing, then run passes. A failed pass is
/// logged and the loop continues; a transient synthesis error must not
/// kill the editor's cache thread.
fn run(shared: &Shared) {
    trace!("preroll worker started");
    let mut warned_bad_fps = false;

    while !shared.should_exit.load(Ordering::SeqCst) {
        if !shared.state().is_playing {
            thread::sleep(IDLE_SLEEP);
            continue;
        }
        if let Err(e) = pass(shared, &mut warned_bad_fps) {
            warn!("pre-roll pass aborted: {}", e);
        }
    }

    trace!("preroll worker stopped");
}

/// One pass of the cache loop: settings snapshot, mode decision, window
/// walk, post-processing, half-frame sleep.
fn pass(shared: &Shared, warned_bad_fps: &mut bool) -> Result<(), ReaderError> {
    let settings = (shared.snapshot_settings)();
    let info = shared.reader.info().clone();
    let cache = shared.reader.cache();

    let mut fps = info.fps.to_f64();
    if !fps.is_finite() || fps <= 0.0 {
        if !*warned_bad_fps {
            warn!("reader reports fps {}, assuming {}", info.fps, FALLBACK_FPS);
            *warned_bad_fps = true;
        }
        fps = FALLBACK_FPS;
    }
    // Fractional microseconds; at high fps a whole-microsecond truncation
    // would skew the half-frame pacing.
    let frame_duration_us = 1_000_000.0 / fps;
    let half_frame = Duration::from_secs_f64(frame_duration_us / 2.0 / 1_000_000.0);

    let current_speed;
    let increment;
    let starting_frame;
    let ending_frame;
    let max_ahead;
    let min_ahead;
    {
        let mut st = shared.state();
        st.min_frames_ahead = settings.video_cache_min_preroll_frames;
        st.max_frames_ahead = settings.video_cache_max_preroll_frames;

        // An external agent purged the cache: restart the pre-roll.
        if cache.count() == 0 {
            st.clear_pause_latch();
            st.cached_frame_count = 0;
        }

        current_speed = st.speed;
        let mut inc = current_speed as i64;

        if (current_speed == 0 && st.should_pause_cache) || !settings.enable_playback_caching {
            // Paused with the fill already done, or caching disabled.
            st.current_display_frame = st.requested_display_frame.max(1);
            drop(st);
            thread::sleep(half_frame);
            return Ok(());
        }

        if current_speed == 0 {
            // First paused pass: latch, then widen the window to the cache
            // byte budget so the fill covers everything that fits.
            st.should_pause_cache = true;

            let (mut width, mut height) = (info.width, info.height);
            if let Some(preview) = shared.reader.as_preview_sized() {
                // Preview frames can be smaller than source frames, so
                // more of them fit in the same budget.
                if preview.preview_width() != width || preview.preview_height() != height {
                    width = preview.preview_width();
                    height = preview.preview_height();
                }
            }
            let frame_bytes =
                bytes_per_frame(width, height, info.sample_rate, info.channels, fps).max(1);

            if cache.max_bytes() > 0 {
                let fitting = cache.max_bytes() / frame_bytes;
                let mut window =
                    (fitting as f64 * settings.video_cache_percent_ahead) as i64;
                if window > settings.video_cache_max_frames {
                    window = settings.video_cache_max_frames;
                }
                st.max_frames_ahead = window.min(ABSOLUTE_MAX_WINDOW);
                debug!(
                    "paused fill: {} bytes/frame, window {} frames",
                    frame_bytes, st.max_frames_ahead
                );
            }

            // Fill in the direction the user was last moving; a cold start
            // (never played) fills forward.
            inc = if st.last_speed >= 0 { 1 } else { -1 };
        } else {
            st.clear_pause_latch();
        }

        increment = inc;
        starting_frame = st.current_display_frame.max(1);
        ending_frame = if st.last_speed >= 0 {
            starting_frame + st.max_frames_ahead
        } else {
            (starting_frame - st.max_frames_ahead).max(1)
        };
        max_ahead = st.max_frames_ahead;
        min_ahead = st.min_frames_ahead;
    }

    // Walk the whole window every pass. Resident frames are nearly free;
    // only the misses cost anything, and revisiting fills holes left by a
    // fragmented cache (user clicking all over the timeline).
    let mut uncached_count: i64 = 0;
    let mut already_cached: i64 = 0;
    let mut result = Ok(());

    let mut cache_frame = starting_frame;
    loop {
        if increment > 0 && cache_frame > ending_frame {
            break;
        }
        if increment < 0 && cache_frame < ending_frame {
            break;
        }

        shared.state().cached_frame_count += 1;

        if !cache.contains(cache_frame) {
            // No lock held across the (potentially long) synthesis call.
            match shared.reader.get_frame(cache_frame) {
                Ok(frame) => {
                    uncached_count += 1;
                    shared.state().last_cached_frame = Some(frame);
                }
                // Timeline edges are routine, not failures.
                Err(ReaderError::OutOfBounds { .. }) => {}
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        } else {
            already_cached += 1;
        }

        // Cancellation checkpoints.
        {
            let mut st = shared.state();
            if st.requested_display_frame != st.current_display_frame {
                let requested = st.requested_display_frame;
                let outside = if st.speed >= 0 {
                    requested < starting_frame || requested > ending_frame
                } else {
                    requested > starting_frame || requested < ending_frame
                };
                if outside {
                    st.clear_pause_latch();
                    break;
                }
            }
            if st.speed != current_speed {
                break;
            }
            if !st.is_playing {
                break;
            }
        }
        if shared.should_exit.load(Ordering::SeqCst) {
            break;
        }

        cache_frame += increment;
    }

    trace!(
        "pass [{}..{}] step {}: {} fetched, {} already resident",
        starting_frame,
        ending_frame,
        increment,
        uncached_count,
        already_cached
    );

    {
        let mut st = shared.state();
        if current_speed == 1 && st.cached_frame_count > max_ahead && uncached_count > min_ahead {
            // Mostly misses: effectively still pre-rolling, so gate the UI
            // again until the window re-fills.
            st.cached_frame_count = 0;
        }
        st.current_display_frame = st.requested_display_frame.max(1);
        if current_speed != 0 {
            st.last_speed = current_speed;
        }
    }

    thread::sleep(half_frame);
    result
}
