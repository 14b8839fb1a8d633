// Job worker: decode -> extract -> infer on a blocking thread
//
// The worker never touches orchestrator state. It reports through a
// `ProgressSender`, which compares the job's generation against the shared
// counter before every send; once the job is superseded or its receiver is
// gone the worker stops at the next stage boundary and sends nothing more.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use tokio::sync::mpsc;

use crate::analysis::{
    AudioFeatures, ExtractionProgress, FeatureExtractor, InferenceEngine, PredictionResult,
};
use crate::audio::{AudioBuffer, AudioDecoder, AudioFormat, AudioInput};
use crate::error::{ExtractionError, PipelineError};
use crate::testing::synth;

use super::channel::{WorkerMessage, WorkerPayload};
use super::progress::{ProgressTracker, Stage};

/// Frequency of the synthetic tone used for dry runs
const DRY_RUN_TONE_HZ: f32 = 2_000.0;

/// Sending half of a job's channel, bound to its generation
pub(crate) struct ProgressSender {
    generation: u64,
    current: Arc<AtomicU64>,
    tx: mpsc::UnboundedSender<WorkerMessage>,
    tracker: ProgressTracker,
}

impl ProgressSender {
    pub(crate) fn new(
        generation: u64,
        current: Arc<AtomicU64>,
        tx: mpsc::UnboundedSender<WorkerMessage>,
    ) -> Self {
        Self {
            generation,
            current,
            tx,
            tracker: ProgressTracker::new(),
        }
    }

    /// Whether anyone still wants this job's messages
    pub(crate) fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.generation && !self.tx.is_closed()
    }

    /// Report progress through `stage`; returns false once the job is stale
    pub(crate) fn progress(&mut self, stage: Stage, fraction: f32, message: impl Into<String>) -> bool {
        if !self.is_current() {
            return false;
        }
        if let Some(info) = self.tracker.advance(stage, fraction, message) {
            self.send(WorkerPayload::Progress(info));
        }
        true
    }

    fn finish(self, payload: WorkerPayload) {
        if self.is_current() {
            self.send(payload);
        }
    }

    fn send(&self, payload: WorkerPayload) {
        // A closed receiver means the orchestrator stopped listening
        let _ = self.tx.send(WorkerMessage::new(self.generation, payload));
    }
}

/// The blocking stages shared by every job of one orchestrator
pub(crate) struct JobStages {
    pub(crate) decoder: AudioDecoder,
    pub(crate) extractor: FeatureExtractor,
    pub(crate) engine: InferenceEngine,
}

impl JobStages {
    /// Run one job to completion and send its terminal message
    pub(crate) fn run_job(&self, input: AudioInput, format: AudioFormat, mut sender: ProgressSender) {
        let generation = sender.generation;
        match self.execute(input, format, &mut sender) {
            Ok(Some(prediction)) => sender.finish(WorkerPayload::Complete(prediction)),
            Ok(None) => debug!("[PipelineWorker] Job {} abandoned", generation),
            Err(err) => sender.finish(WorkerPayload::Error(err)),
        }
    }

    /// `Ok(None)` means the job went stale and was abandoned
    fn execute(
        &self,
        input: AudioInput,
        format: AudioFormat,
        sender: &mut ProgressSender,
    ) -> Result<Option<PredictionResult>, PipelineError> {
        if !sender.progress(Stage::Loading, 0.0, "Decoding audio") {
            return Ok(None);
        }
        let buffer = self.decoder.decode_validated(input, format)?;
        let seconds = buffer.duration().as_secs_f32();
        if !sender.progress(
            Stage::Loading,
            1.0,
            format!("Decoded {:.1} s of audio", seconds),
        ) {
            return Ok(None);
        }

        let extracted = self.extractor.extract_with_progress(&buffer, |update| match update {
            ExtractionProgress::Preprocessing { fraction } => {
                sender.progress(Stage::Preprocessing, fraction, "Preparing audio")
            }
            ExtractionProgress::Extracting {
                frames_done,
                frames_total,
            } => {
                let fraction = frames_done as f32 / frames_total.max(1) as f32;
                sender.progress(
                    Stage::Extracting,
                    fraction,
                    format!("Extracting features ({}/{} frames)", frames_done, frames_total),
                )
            }
        });
        let Some(features) = keep_unless_cancelled(extracted)? else {
            return Ok(None);
        };
        // Samples are no longer needed once features exist
        drop(buffer);

        if !sender.progress(Stage::Predicting, 0.0, "Running classifier") {
            return Ok(None);
        }
        let prediction = self.engine.predict(&features)?;
        if !sender.progress(Stage::Predicting, 1.0, "Resolving result") {
            return Ok(None);
        }
        Ok(Some(prediction))
    }

    /// Extract and classify a short synthetic tone without publishing anything
    pub(crate) fn dry_run(&self, signal_ms: u32) -> Result<PredictionResult, PipelineError> {
        let sample_rate = self.extractor.config().sample_rate;
        let samples = synth::sine(
            DRY_RUN_TONE_HZ,
            signal_ms as f32 / 1000.0,
            sample_rate,
            0.5,
        );
        let buffer = AudioBuffer::new(samples, sample_rate);
        let features = self.extractor.extract(&buffer)?;
        Ok(self.engine.predict(&features)?)
    }
}

/// A superseded job stops extraction through its progress callback; that
/// abandonment is not a failure.
fn keep_unless_cancelled(
    extracted: Result<AudioFeatures, ExtractionError>,
) -> Result<Option<AudioFeatures>, PipelineError> {
    match extracted {
        Ok(features) => Ok(Some(features)),
        Err(ExtractionError::Cancelled { frame }) => {
            debug!("Extraction stopped at frame {} for a superseded job", frame);
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AudioProcessorConfig, DecoderConfig};
    use crate::testing::stubs::FixedBackend;
    use crate::testing::wav;

    fn small_audio() -> AudioProcessorConfig {
        AudioProcessorConfig {
            n_fft: 512,
            hop_length: 256,
            n_mels: 40,
            max_length: 22_050,
            ..AudioProcessorConfig::default()
        }
    }

    fn stages() -> JobStages {
        let audio = small_audio();
        let backend = FixedBackend::new(vec!["a".to_string(), "b".to_string()], vec![0.9, 0.1]);
        JobStages {
            decoder: AudioDecoder::new(audio.sample_rate, DecoderConfig::default()),
            extractor: FeatureExtractor::new(audio),
            engine: InferenceEngine::new(Arc::new(backend)).unwrap(),
        }
    }

    fn wav_input() -> (AudioInput, AudioFormat) {
        let samples = synth::sine(3_000.0, 1.0, 22_050, 0.5);
        let input = AudioInput::new("call.wav", wav::encode_mono_i16(&samples, 22_050).unwrap());
        (input, AudioFormat::Wav)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WorkerMessage>) -> Vec<WorkerMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = rx.try_recv() {
            messages.push(message);
        }
        messages
    }

    #[test]
    fn test_job_reports_ordered_progress_then_completes() {
        let stages = stages();
        let current = Arc::new(AtomicU64::new(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (input, format) = wav_input();

        stages.run_job(input, format, ProgressSender::new(1, current, tx));
        let messages = drain(&mut rx);

        let mut last_stage = Stage::Loading;
        let mut last_percent = 0;
        for message in &messages[..messages.len() - 1] {
            assert_eq!(message.generation, 1);
            match &message.payload {
                WorkerPayload::Progress(info) => {
                    assert!(info.stage >= last_stage);
                    assert!(info.percent >= last_percent);
                    assert!(info.percent < 100);
                    last_stage = info.stage;
                    last_percent = info.percent;
                }
                other => panic!("unexpected payload {:?}", other),
            }
        }
        assert_eq!(last_stage, Stage::Predicting);
        match &messages.last().unwrap().payload {
            WorkerPayload::Complete(prediction) => assert_eq!(prediction.label, "a"),
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_stale_job_sends_nothing() {
        let stages = stages();
        let current = Arc::new(AtomicU64::new(2));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (input, format) = wav_input();

        stages.run_job(input, format, ProgressSender::new(1, current, tx));
        assert!(drain(&mut rx).is_empty());
        assert_eq!(stages.extractor.extraction_count(), 0);
    }

    #[test]
    fn test_decode_failure_is_terminal_error() {
        let stages = stages();
        let current = Arc::new(AtomicU64::new(1));
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input = AudioInput::new("broken.wav", vec![0x42; 512]);

        stages.run_job(input, AudioFormat::Wav, ProgressSender::new(1, current, tx));
        let messages = drain(&mut rx);
        match &messages.last().unwrap().payload {
            WorkerPayload::Error(err) => {
                assert_eq!(err.kind(), crate::error::ErrorKind::CorruptAudio)
            }
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(stages.extractor.extraction_count(), 0);
    }

    #[test]
    fn test_dry_run_uses_extractor_and_engine() {
        let stages = stages();
        let prediction = stages.dry_run(250).unwrap();
        assert_eq!(prediction.label, "a");
        assert_eq!(stages.extractor.extraction_count(), 1);
    }

    #[test]
    fn test_cancelled_extraction_is_abandonment() {
        let stopped = keep_unless_cancelled(Err(ExtractionError::Cancelled { frame: 3 }));
        assert!(matches!(stopped, Ok(None)));

        let failed = keep_unless_cancelled(Err(ExtractionError::EmptySpectrum { frame: 3 }));
        assert!(matches!(
            failed,
            Err(PipelineError::Extraction(ExtractionError::EmptySpectrum { frame: 3 }))
        ));
    }
}
