//! Lazily bound classifier and the adapter that turns its output into probabilities.
//!
//! A [`ClassifierHandle`] is created once per process and shared by every
//! request. Its loader runs at most once, on first use, even when several
//! threads race for it. After that the handle is either bound to a model or
//! permanently absent, in which case [`ClassifierAdapter`] draws scores from
//! [`fallback_probabilities`].

use crate::config::{LabelOrder, PipelineConfig};
use crate::error::{InferenceError, ModelError};
use crate::models::OnnxClassifier;
use crate::traits::Classifier;
use crate::types::{Probabilities, ScoreSource};
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::SessionBuilder;
use rand::Rng;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

/// Classifier shared across requests.
pub type SharedClassifier = Arc<BoundClassifier>;

/// Loaded classifier plus the gate that admits one inference at a time.
///
/// Requests queue on the gate without a deadline while a healthy inference
/// runs. Once an inference overruns its timeout the gate is stalled: queued
/// and new requests fail with [`InferenceError::Busy`] until it finishes.
pub struct BoundClassifier {
    model: Mutex<Box<dyn Classifier>>,
    gate: Mutex<Gate>,
    released: Condvar,
}

#[derive(Debug, Default)]
struct Gate {
    busy: bool,
    stalled: bool,
    /// Incremented on every admission, so a late timeout cannot stall a newer run.
    generation: u64,
}

/// Exclusive right to run the model; releases the gate on drop, including on panic.
struct Permit {
    classifier: SharedClassifier,
    generation: u64,
}

impl BoundClassifier {
    fn new(model: Box<dyn Classifier>) -> Self {
        Self {
            model: Mutex::new(model),
            gate: Mutex::new(Gate::default()),
            released: Condvar::new(),
        }
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wait for the running inference to finish, then claim the model.
    fn acquire(self: &Arc<Self>) -> Result<Permit, InferenceError> {
        let mut gate = self.gate();

        while gate.busy && !gate.stalled {
            gate = self
                .released
                .wait(gate)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if gate.stalled {
            return Err(InferenceError::Busy);
        }

        gate.busy = true;
        gate.generation += 1;

        Ok(Permit {
            classifier: Arc::clone(self),
            generation: gate.generation,
        })
    }

    /// Reject queued and new requests until the run `generation` finishes.
    fn stall(&self, generation: u64) {
        let mut gate = self.gate();
        if gate.busy && gate.generation == generation {
            gate.stalled = true;
            drop(gate);
            self.released.notify_all();
        }
    }

    /// Whether an inference is admitted right now.
    pub fn is_busy(&self) -> bool {
        self.gate().busy
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        let mut gate = self.classifier.gate();
        gate.busy = false;
        gate.stalled = false;
        drop(gate);
        self.classifier.released.notify_all();
    }
}

/// Produces the classifier on first use; `Ok(None)` means no model is available.
type Loader = Box<dyn Fn() -> Result<Option<Box<dyn Classifier>>, ModelError> + Send + Sync>;

fn no_classifier() -> Result<Option<Box<dyn Classifier>>, ModelError> {
    Ok(None)
}

/// Process-wide, initialize-once classifier slot.
pub struct ClassifierHandle {
    loader: Loader,
    slot: OnceLock<Option<SharedClassifier>>,
}

impl ClassifierHandle {
    /// Handle with no model; every request uses fallback scores.
    pub fn absent() -> Self {
        Self {
            loader: Box::new(no_classifier),
            slot: OnceLock::from(None),
        }
    }

    /// Handle bound to an already constructed classifier.
    pub fn bound(classifier: impl Classifier + 'static) -> Self {
        let classifier: Box<dyn Classifier> = Box::new(classifier);
        Self {
            loader: Box::new(no_classifier),
            slot: OnceLock::from(Some(Arc::new(BoundClassifier::new(classifier)))),
        }
    }

    /// Handle whose classifier is produced by `loader` on first use.
    pub fn lazy<F>(loader: F) -> Self
    where
        F: Fn() -> Result<Option<Box<dyn Classifier>>, ModelError> + Send + Sync + 'static,
    {
        Self {
            loader: Box::new(loader),
            slot: OnceLock::new(),
        }
    }

    /// Lazily load an ONNX model with a default CPU session.
    pub fn onnx(path: impl Into<PathBuf>) -> Self {
        Self::onnx_with(path, Session::builder)
    }

    /// Lazily load an ONNX model with a caller-configured session builder.
    ///
    /// A missing file leaves the handle absent rather than failing.
    pub fn onnx_with<F>(path: impl Into<PathBuf>, builder: F) -> Self
    where
        F: Fn() -> ort::Result<SessionBuilder> + Send + Sync + 'static,
    {
        let path = path.into();

        Self::lazy(move || {
            if !path.is_file() {
                tracing::info!(path = ?path.display(), "model file not found");
                return Ok(None);
            }

            let classifier = OnnxClassifier::from_file(&path, builder()?)?;
            Ok(Some(Box::new(classifier) as Box<dyn Classifier>))
        })
    }

    /// Bound classifier, running the loader if this is the first call.
    pub fn get(&self) -> Option<&SharedClassifier> {
        self.slot.get_or_init(|| self.load()).as_ref()
    }

    /// Whether the loader has already run (or was never needed).
    pub fn is_initialized(&self) -> bool {
        self.slot.get().is_some()
    }

    fn load(&self) -> Option<SharedClassifier> {
        match (self.loader)() {
            Ok(Some(classifier)) => {
                tracing::info!("classifier bound");
                Some(Arc::new(BoundClassifier::new(classifier)))
            }
            Ok(None) => {
                tracing::warn!("no classifier available, predictions use fallback scores");
                None
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "failed to load classifier, predictions use fallback scores"
                );
                None
            }
        }
    }
}

impl fmt::Debug for ClassifierHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.slot.get() {
            None => "uninitialized",
            Some(None) => "absent",
            Some(Some(_)) => "bound",
        };
        f.debug_struct("ClassifierHandle")
            .field("state", &state)
            .finish()
    }
}

/// Runs inference through a shared handle and maps output indices to labels.
#[derive(Clone, Debug)]
pub struct ClassifierAdapter {
    handle: Arc<ClassifierHandle>,
    label_order: LabelOrder,
    timeout: Duration,
}

impl ClassifierAdapter {
    pub fn new(handle: Arc<ClassifierHandle>, label_order: LabelOrder, timeout: Duration) -> Self {
        Self {
            handle,
            label_order,
            timeout,
        }
    }

    pub fn from_config(handle: Arc<ClassifierHandle>, config: &PipelineConfig) -> Self {
        Self::new(handle, config.label_order, config.inference_timeout())
    }

    pub fn handle(&self) -> &ClassifierHandle {
        &self.handle
    }

    /// Probability pair for one feature tensor.
    ///
    /// Without a bound classifier this draws from the fallback distribution
    /// and never fails.
    ///
    /// # Errors
    ///
    /// Returns an [`InferenceError`] if the model fails, times out, or emits
    /// something other than two usable scores.
    pub fn classify(&self, features: Array4<f32>) -> Result<Probabilities, InferenceError> {
        let Some(classifier) = self.handle.get() else {
            let probs = fallback_probabilities(&mut rand::rng());
            tracing::debug!(genuine = probs.genuine, "fallback scores");
            return Ok(probs);
        };

        let scores = run_with_timeout(classifier, features, self.timeout)?;
        self.interpret(&scores)
    }

    /// Read a raw two-class output according to the configured label order.
    pub fn interpret(&self, scores: &[f32]) -> Result<Probabilities, InferenceError> {
        if scores.len() != 2 {
            return Err(ModelError::OutputLength {
                expected: 2,
                got: scores.len(),
            }
            .into());
        }

        let genuine = scores[self.label_order.genuine_index()];
        let spoofed = scores[self.label_order.spoofed_index()];

        Probabilities::normalized(genuine, spoofed, ScoreSource::Model)
            .ok_or_else(|| InferenceError::InvalidOutput(format!("{scores:?}")))
    }
}

/// Run one prediction on a worker thread, giving up after `timeout`.
///
/// The clock starts once the model is admitted, so time spent queued behind
/// other requests does not count. A timed-out worker keeps the model until it
/// finishes and the gate rejects requests meanwhile, so at most one worker
/// is ever alive per classifier.
fn run_with_timeout(
    classifier: &SharedClassifier,
    features: Array4<f32>,
    timeout: Duration,
) -> Result<Vec<f32>, InferenceError> {
    let permit = classifier.acquire()?;
    let generation = permit.generation;
    let (tx, rx) = mpsc::sync_channel(1);

    thread::Builder::new()
        .name("vs-inference".to_string())
        .spawn(move || {
            let permit = permit;
            let result = match permit.classifier.model.lock() {
                Ok(mut model) => model.predict(features).map_err(InferenceError::from),
                Err(_) => Err(InferenceError::Poisoned),
            };
            // The receiver is gone if the caller already timed out.
            let _ = tx.send(result);
        })
        .map_err(InferenceError::Spawn)?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            classifier.stall(generation);
            tracing::warn!(?timeout, "inference overran its timeout");
            Err(InferenceError::Timeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(InferenceError::WorkerPanicked),
    }
}

/// Score drawn in place of a model prediction.
///
/// A uniform draw picks a band: above 0.6 favours genuine, below 0.3 favours
/// spoofed, anything else is near even. Both values are clamped into
/// [0.001, 0.999] and renormalized.
pub fn fallback_probabilities<R: Rng>(rng: &mut R) -> Probabilities {
    let score: f32 = rng.random();

    let genuine = if score > 0.6 {
        rng.random_range(0.7..=0.95)
    } else if score < 0.3 {
        1.0 - rng.random_range(0.7..=0.95)
    } else {
        rng.random_range(0.4..=0.6)
    };

    let genuine = f32::clamp(genuine, 0.001, 0.999);
    let spoofed = f32::clamp(1.0 - genuine, 0.001, 0.999);
    let total = genuine + spoofed;

    Probabilities {
        genuine: genuine / total,
        spoofed: spoofed / total,
        source: ScoreSource::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedClassifier(Vec<f32>);

    impl Classifier for FixedClassifier {
        fn predict(&mut self, _features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            Ok(self.0.clone())
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&mut self, _features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            Err(ModelError::MissingOutput {
                name: "probabilities".to_string(),
            })
        }
    }

    struct SlowClassifier(Duration);

    impl Classifier for SlowClassifier {
        fn predict(&mut self, _features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            thread::sleep(self.0);
            Ok(vec![0.5, 0.5])
        }
    }

    /// Sleeps on every call and counts how many predictions started.
    struct CountingClassifier {
        delay: Duration,
        calls: Arc<AtomicUsize>,
    }

    impl Classifier for CountingClassifier {
        fn predict(&mut self, _features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            Ok(vec![0.7, 0.3])
        }
    }

    struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn predict(&mut self, _features: Array4<f32>) -> Result<Vec<f32>, ModelError> {
            panic!("runtime crashed");
        }
    }

    fn features() -> Array4<f32> {
        Array4::zeros((1, 40, 94, 1))
    }

    fn adapter(handle: ClassifierHandle, order: LabelOrder) -> ClassifierAdapter {
        ClassifierAdapter::new(Arc::new(handle), order, Duration::from_secs(5))
    }

    #[test]
    fn reads_genuine_first_output() {
        let adapter = adapter(
            ClassifierHandle::bound(FixedClassifier(vec![0.8, 0.2])),
            LabelOrder::GENUINE_FIRST,
        );

        let probs = adapter.classify(features()).unwrap();

        assert!((probs.genuine - 0.8).abs() < 1e-6);
        assert!((probs.spoofed - 0.2).abs() < 1e-6);
        assert_eq!(probs.source, ScoreSource::Model);
    }

    #[test]
    fn reads_spoofed_first_output() {
        let adapter = adapter(
            ClassifierHandle::bound(FixedClassifier(vec![0.8, 0.2])),
            LabelOrder::SPOOFED_FIRST,
        );

        let probs = adapter.classify(features()).unwrap();

        assert!((probs.genuine - 0.2).abs() < 1e-6);
        assert!((probs.spoofed - 0.8).abs() < 1e-6);
    }

    #[test]
    fn renormalizes_model_output() {
        let adapter = adapter(
            ClassifierHandle::bound(FixedClassifier(vec![3.0, 1.0])),
            LabelOrder::GENUINE_FIRST,
        );

        let probs = adapter.classify(features()).unwrap();

        assert!((probs.genuine + probs.spoofed - 1.0).abs() < 1e-6);
        assert!((probs.genuine - 0.75).abs() < 1e-6);
    }

    #[test]
    fn rejects_wrong_output_length() {
        let adapter = adapter(
            ClassifierHandle::bound(FixedClassifier(vec![0.2, 0.3, 0.5])),
            LabelOrder::GENUINE_FIRST,
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Model(ModelError::OutputLength {
                expected: 2,
                got: 3
            }))
        ));
    }

    #[test]
    fn rejects_non_finite_output() {
        let adapter = adapter(
            ClassifierHandle::bound(FixedClassifier(vec![f32::NAN, 0.5])),
            LabelOrder::GENUINE_FIRST,
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::InvalidOutput(_))
        ));
    }

    #[test]
    fn propagates_model_failure() {
        let adapter = adapter(
            ClassifierHandle::bound(FailingClassifier),
            LabelOrder::GENUINE_FIRST,
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Model(ModelError::MissingOutput { .. }))
        ));
    }

    #[test]
    fn times_out_slow_inference() {
        let adapter = ClassifierAdapter::new(
            Arc::new(ClassifierHandle::bound(SlowClassifier(
                Duration::from_millis(500),
            ))),
            LabelOrder::GENUINE_FIRST,
            Duration::from_millis(20),
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Timeout(_))
        ));
    }

    #[test]
    fn queued_requests_do_not_spend_their_timeout() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = ClassifierAdapter::new(
            Arc::new(ClassifierHandle::bound(CountingClassifier {
                delay: Duration::from_millis(60),
                calls: Arc::clone(&calls),
            })),
            LabelOrder::GENUINE_FIRST,
            Duration::from_millis(200),
        );

        thread::scope(|scope| {
            let workers: Vec<_> = (0..10)
                .map(|_| scope.spawn(|| adapter.classify(features())))
                .collect();

            for worker in workers {
                let probs = worker.join().unwrap().unwrap();
                assert_eq!(probs.source, ScoreSource::Model);
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn hung_model_is_not_called_again() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = ClassifierAdapter::new(
            Arc::new(ClassifierHandle::bound(CountingClassifier {
                delay: Duration::from_secs(5),
                calls: Arc::clone(&calls),
            })),
            LabelOrder::GENUINE_FIRST,
            Duration::from_millis(20),
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Timeout(_))
        ));

        for _ in 0..50 {
            assert!(matches!(
                adapter.classify(features()),
                Err(InferenceError::Busy)
            ));
        }

        // Only the first request ever reached the model, so only one worker exists.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(adapter.handle().get().unwrap().is_busy());
    }

    #[test]
    fn gate_reopens_after_slow_inference_finishes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let adapter = ClassifierAdapter::new(
            Arc::new(ClassifierHandle::bound(CountingClassifier {
                delay: Duration::from_millis(100),
                calls: Arc::clone(&calls),
            })),
            LabelOrder::GENUINE_FIRST,
            Duration::from_millis(20),
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Timeout(_))
        ));

        thread::sleep(Duration::from_millis(300));
        assert!(!adapter.handle().get().unwrap().is_busy());

        // Long enough now for the 100ms model.
        let adapter = ClassifierAdapter::new(
            Arc::clone(&adapter.handle),
            LabelOrder::GENUINE_FIRST,
            Duration::from_secs(5),
        );
        assert!(adapter.classify(features()).is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn reports_panicking_worker() {
        let adapter = adapter(
            ClassifierHandle::bound(PanickingClassifier),
            LabelOrder::GENUINE_FIRST,
        );

        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::WorkerPanicked)
        ));
        assert!(matches!(
            adapter.classify(features()),
            Err(InferenceError::Poisoned)
        ));
    }

    #[test]
    fn absent_handle_uses_fallback() {
        let adapter = adapter(ClassifierHandle::absent(), LabelOrder::GENUINE_FIRST);

        for _ in 0..100 {
            let probs = adapter.classify(features()).unwrap();
            assert_eq!(probs.source, ScoreSource::Fallback);
            assert!((probs.genuine + probs.spoofed - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn missing_model_file_leaves_handle_absent() {
        let handle = ClassifierHandle::onnx(std::env::temp_dir().join("vs_no_such_model.onnx"));

        assert!(!handle.is_initialized());
        assert!(handle.get().is_none());
        assert!(handle.is_initialized());
    }

    #[test]
    fn failed_load_leaves_handle_absent() {
        let handle = ClassifierHandle::lazy(|| {
            Err(ModelError::MissingTensor { kind: "input" })
        });

        assert!(handle.get().is_none());
    }

    #[test]
    fn loader_runs_once_under_contention() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let handle = Arc::new(ClassifierHandle::lazy(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(20));
            Ok(Some(
                Box::new(FixedClassifier(vec![0.6, 0.4])) as Box<dyn Classifier>
            ))
        }));

        thread::scope(|scope| {
            for _ in 0..8 {
                let handle = Arc::clone(&handle);
                scope.spawn(move || assert!(handle.get().is_some()));
            }
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn fallback_always_sums_to_one() {
        let mut rng = StdRng::seed_from_u64(42);

        for _ in 0..10_000 {
            let probs = fallback_probabilities(&mut rng);
            assert!((probs.genuine + probs.spoofed - 1.0).abs() < 1e-6);
            assert!((0.001..=0.999).contains(&probs.genuine));
            assert!((0.001..=0.999).contains(&probs.spoofed));
        }
    }

    #[test]
    fn fallback_bands_follow_score_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let draws = 10_000;

        let (mut genuine, mut spoofed, mut even) = (0, 0, 0);
        for _ in 0..draws {
            let probs = fallback_probabilities(&mut rng);
            if probs.genuine > 0.6 {
                genuine += 1;
            } else if probs.spoofed > 0.6 {
                spoofed += 1;
            } else {
                even += 1;
            }
        }

        let share = |n: i32| n as f32 / draws as f32;

        // Expected 0.4 / 0.3 / 0.3
        assert!((share(genuine) - 0.4).abs() < 0.03, "genuine {}", share(genuine));
        assert!((share(spoofed) - 0.3).abs() < 0.03, "spoofed {}", share(spoofed));
        assert!((share(even) - 0.3).abs() < 0.03, "even {}", share(even));
    }
}
