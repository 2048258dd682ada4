//! Text recognition adapters.
//!
//! A recognizer is constructed once by the caller and handed to the session,
//! which owns it for the life of the process. Nothing here is global.

use std::collections::VecDeque;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};

use crate::logger;
use crate::settings::RecognizerSettings;
use crate::types::{Frame, Recognition};

#[cfg(feature = "oar")]
pub use self::oar::OarRecognizer;

pub trait Recognizer: Send {
    /// Recognize at most one text line in `roi`.
    ///
    /// `Ok(None)` means no text was found; `Err` means the engine itself is unusable.
    fn recognize(&mut self, roi: &Frame) -> Result<Option<Recognition>>;
}

/// Load the configured OCR engine and put it behind the per-call timeout.
#[cfg(feature = "oar")]
pub fn open_engine(settings: &RecognizerSettings) -> Result<Box<dyn Recognizer>> {
    let engine = OarRecognizer::new(settings)?;
    Ok(Box::new(TimedRecognizer::new(engine, settings.timeout())?))
}

#[cfg(not(feature = "oar"))]
pub fn open_engine(_settings: &RecognizerSettings) -> Result<Box<dyn Recognizer>> {
    bail!("built without the `oar` feature, only --stub is available")
}

#[cfg(feature = "oar")]
mod oar {
    use std::path::Path;

    use anyhow::{anyhow, bail, Context, Result};
    use oar_ocr::core::config::onnx::{OrtExecutionProvider, OrtSessionConfig};
    use oar_ocr::core::traits::StandardPredictor;
    use oar_ocr::predictor::{TextRecPredictor, TextRecPredictorBuilder};
    use oar_ocr::utils::create_rgb_image;

    use super::Recognizer;
    use crate::logger;
    use crate::settings::RecognizerSettings;
    use crate::types::{Frame, Recognition};

    // PP-OCRv5 recognition models take 48px high lines.
    const INPUT_SHAPE: [usize; 3] = [3, 48, 320];

    /// In-process PP-OCR text line recognizer on ONNX Runtime.
    pub struct OarRecognizer {
        predictor: TextRecPredictor,
    }

    impl OarRecognizer {
        pub fn new(settings: &RecognizerSettings) -> Result<Self> {
            let model = settings.model_path.as_path();
            if !model.exists() {
                bail!("recognition model not found: {}", model.display());
            }
            let dict = read_dict(&settings.dict_path)?;

            let predictor = TextRecPredictorBuilder::new()
                .model_input_shape(INPUT_SHAPE)
                .batch_size(1)
                .character_dict(dict)
                .model_name(settings.model_name.clone())
                .ort_session(
                    OrtSessionConfig::new()
                        .with_execution_providers(vec![OrtExecutionProvider::CPU]),
                )
                .build(model)
                .map_err(|e| anyhow!("cannot load {}: {}", model.display(), e))?;

            logger::info_p(
                "ocr",
                &format!("engine ready: {} ({})", settings.model_name, model.display()),
            );
            Ok(Self { predictor })
        }
    }

    impl Recognizer for OarRecognizer {
        fn recognize(&mut self, roi: &Frame) -> Result<Option<Recognition>> {
            let rgb = roi
                .to_rgb_bytes()
                .context("region buffer does not match its dimensions")?;
            let img = create_rgb_image(roi.width, roi.height, rgb)
                .context("region buffer does not match its dimensions")?;

            let result = self
                .predictor
                .predict(vec![img], None)
                .map_err(|e| anyhow!("recognition failed: {}", e))?;
            Ok(best_line(
                result.rec_text.first().map(|t| t.as_ref()),
                result.rec_score.first().copied(),
            ))
        }
    }

    fn read_dict(path: &Path) -> Result<Vec<String>> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read character dictionary {}", path.display()))?;
        let dict: Vec<String> = text.lines().map(str::to_string).collect();
        if dict.is_empty() {
            bail!("character dictionary {} is empty", path.display());
        }
        Ok(dict)
    }

    /// The decoder yields an empty line when the crop holds no text.
    pub(super) fn best_line(text: Option<&str>, score: Option<f32>) -> Option<Recognition> {
        let text = text?.trim();
        if text.is_empty() {
            return None;
        }
        Some(Recognition {
            text: text.to_string(),
            confidence: score.unwrap_or(0.0).clamp(0.0, 1.0),
        })
    }

}

type Reply = (u64, Result<Option<Recognition>>);

/// Runs a recognizer on its own thread and gives up on any call that takes
/// longer than `timeout`, so a stuck engine cannot hold the control loop.
///
/// A late answer to an abandoned call is discarded by sequence number.
pub struct TimedRecognizer {
    requests: mpsc::Sender<(u64, Frame)>,
    replies: mpsc::Receiver<Reply>,
    timeout: Duration,
    seq: u64,
}

impl TimedRecognizer {
    pub fn new<R: Recognizer + 'static>(inner: R, timeout: Duration) -> Result<Self> {
        let (requests, request_rx) = mpsc::channel::<(u64, Frame)>();
        let (reply_tx, replies) = mpsc::channel::<Reply>();

        thread::Builder::new()
            .name("lastsec-ocr".into())
            .spawn(move || {
                let mut inner = inner;
                for (seq, roi) in request_rx {
                    let reply = inner.recognize(&roi);
                    if reply_tx.send((seq, reply)).is_err() {
                        break;
                    }
                }
            })
            .context("cannot start recognition thread")?;

        Ok(Self { requests, replies, timeout, seq: 0 })
    }
}

impl Recognizer for TimedRecognizer {
    fn recognize(&mut self, roi: &Frame) -> Result<Option<Recognition>> {
        self.seq += 1;
        let seq = self.seq;
        self.requests
            .send((seq, roi.clone()))
            .map_err(|_| anyhow!("recognition thread exited"))?;

        let deadline = Instant::now() + self.timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(left) {
                Ok((answered, reply)) if answered == seq => return reply,
                Ok((answered, _)) => {
                    logger::info_p("ocr", &format!("dropped late answer to call {}", answered));
                }
                Err(RecvTimeoutError::Timeout) => {
                    bail!("OCR engine did not answer within {} ms", self.timeout.as_millis())
                }
                Err(RecvTimeoutError::Disconnected) => bail!("recognition thread exited"),
            }
        }
    }
}

/// One canned answer of a `ScriptedRecognizer`.
#[derive(Debug, Clone)]
pub enum Scripted {
    Text(String, f32),
    Nothing,
    Fail(String),
}

impl Scripted {
    pub fn text(text: &str) -> Self {
        Scripted::Text(text.to_string(), 0.95)
    }
}

enum Script {
    Replies(VecDeque<Scripted>),
    Countdown { from_secs: u64, started: Option<Instant> },
}

/// Deterministic recognizer for tests and the stub demo.
pub struct ScriptedRecognizer {
    script: Script,
    latency: Duration,
    calls: u64,
}

impl ScriptedRecognizer {
    /// Answer with `replies` in order, then report no text forever.
    pub fn with_replies(replies: Vec<Scripted>) -> Self {
        Self {
            script: Script::Replies(replies.into()),
            latency: Duration::ZERO,
            calls: 0,
        }
    }

    /// Shorthand for a list of text replies.
    pub fn with_texts(texts: &[&str]) -> Self {
        Self::with_replies(texts.iter().map(|t| Scripted::text(t)).collect())
    }

    /// Read a live countdown that starts at `from_secs` on the first call
    /// and starts over after reaching zero.
    pub fn countdown(from_secs: u64) -> Self {
        Self {
            script: Script::Countdown { from_secs, started: None },
            latency: Duration::ZERO,
            calls: 0,
        }
    }

    /// Simulated inference time per call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&mut self, _roi: &Frame) -> Result<Option<Recognition>> {
        self.calls += 1;
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }

        match &mut self.script {
            Script::Replies(replies) => match replies.pop_front() {
                Some(Scripted::Text(text, confidence)) => Ok(Some(Recognition { text, confidence })),
                Some(Scripted::Fail(msg)) => Err(anyhow!(msg)),
                Some(Scripted::Nothing) | None => Ok(None),
            },
            Script::Countdown { from_secs, started } => {
                let started = *started.get_or_insert_with(Instant::now);
                let left = *from_secs - started.elapsed().as_secs() % (*from_secs + 1);
                Ok(Some(Recognition {
                    text: format!("剩余 {} 分 {} 秒", left / 60, left % 60),
                    confidence: 0.97,
                }))
            }
        }
    }
}
