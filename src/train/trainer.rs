use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Instant;

use log::{debug, info, warn};
use rand::RngCore;

use crate::error::{NetError, Result};
use crate::loss::cost::CostFunction;
use crate::math::matrix::Matrix;
use crate::network::network::Network;
use crate::optim::sgd::Sgd;
use crate::train::dataset::{Datapoint, Dataset};
use crate::train::dropout::select_masks;
use crate::train::iteration_stats::{IterationStats, TrainingReport};
use crate::train::logger::Logger;
use crate::train::train_config::TrainConfig;

/// Lowest accepted iteration cap; smaller values are raised to it.
pub const MIN_ITERATIONS: usize = 20;

pub const DEFAULT_LEARNING_RATE: f64 = 0.5;

/// Trains a network on a training set, monitors it on an optional
/// validation set and scores it on a test set.
///
/// Training stops after `max_iterations` full passes, when the monitored
/// loss moves by less than `tolerance` between two passes, or when the stop
/// flag is raised.
pub struct Trainer<'a> {
    network: Network,
    logger: Box<dyn Logger + 'a>,
    training: Box<dyn Dataset + 'a>,
    validation: Option<Box<dyn Dataset + 'a>>,
    test: Box<dyn Dataset + 'a>,
    max_iterations: usize,
    tolerance: f64,
    optimizer: Sgd,
    stop_flag: Option<Arc<AtomicBool>>,
    progress_tx: Option<mpsc::Sender<IterationStats>>,
}

impl<'a> Trainer<'a> {
    /// Builds a trainer and validates it straight away.
    pub fn new(
        network: Network,
        logger: Box<dyn Logger + 'a>,
        training: Box<dyn Dataset + 'a>,
        validation: Option<Box<dyn Dataset + 'a>>,
        test: Box<dyn Dataset + 'a>,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<Trainer<'a>> {
        let mut trainer = Trainer {
            network,
            logger,
            training,
            validation,
            test,
            max_iterations,
            tolerance: tolerance.abs(),
            optimizer: Sgd::new(DEFAULT_LEARNING_RATE),
            stop_flag: None,
            progress_tx: None,
        };
        trainer.validate()?;
        Ok(trainer)
    }

    pub fn with_optimizer(mut self, optimizer: Sgd) -> Self {
        self.optimizer = optimizer;
        self
    }

    /// Training stops at the next iteration boundary once `flag` is set.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_flag = Some(flag);
        self
    }

    /// Sends one `IterationStats` per completed iteration.
    pub fn with_progress(mut self, tx: mpsc::Sender<IterationStats>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Checks the trainer can run. The iteration cap is raised to
    /// `MIN_ITERATIONS` instead of failing.
    pub fn validate(&mut self) -> Result<()> {
        if self.network.layers().is_empty() {
            return Err(NetError::InvalidTrainer("neural network has no layers".to_string()));
        }
        for (i, layer) in self.network.layers().iter().enumerate() {
            if let Err(e) = layer.is_usable() {
                return Err(NetError::InvalidTrainer(format!("layer [{i}]: {e}")));
            }
        }
        if self.training.size() == 0 {
            return Err(NetError::InvalidTrainer("training set is empty".to_string()));
        }
        if self.test.size() == 0 {
            return Err(NetError::InvalidTrainer("test set is empty".to_string()));
        }
        if self.max_iterations < MIN_ITERATIONS {
            warn!("max iterations {} raised to {MIN_ITERATIONS}", self.max_iterations);
            self.max_iterations = MIN_ITERATIONS;
        }
        Ok(())
    }

    /// Runs `train_with_backpropagation` with the hyperparameters of `config`.
    pub fn train<R: RngCore + ?Sized>(&mut self, rng: &mut R, config: &TrainConfig) -> Result<TrainingReport> {
        self.optimizer = Sgd::new(config.learning_rate);
        self.train_with_backpropagation(rng, config.dropout_period, config.dropout_ratio, config.cost)
    }

    /// Trains the network with online backpropagation.
    ///
    /// With `dropout_period > 0`, new dropout masks are drawn from `rng`
    /// every `dropout_period` datapoints, dropping `dropout_ratio` of each
    /// hidden layer. `dropout_ratio` must lie in `(0, 0.9]` either way.
    pub fn train_with_backpropagation<R: RngCore + ?Sized>(
        &mut self,
        rng: &mut R,
        dropout_period: usize,
        dropout_ratio: f64,
        cost: CostFunction,
    ) -> Result<TrainingReport> {
        self.logger.log(format_args!("Check if trainable"));
        self.validate()?;
        if !(dropout_ratio > 0.0 && dropout_ratio <= 0.9) {
            return Err(NetError::InvalidDropoutRatio(dropout_ratio));
        }

        let mut report = TrainingReport {
            iterations: 0,
            training_loss: 0.0,
            validation_loss: None,
            test_loss: 0.0,
            converged: false,
            cancelled: false,
        };
        let mut previous: Option<f64> = None;

        self.logger.log(format_args!("Start training ..."));
        for iteration in 1..=self.max_iterations {
            if self.stop_requested() {
                report.cancelled = true;
                break;
            }

            let t_start = Instant::now();

            let training_loss = training_pass(
                &mut self.network,
                &mut *self.training,
                &self.optimizer,
                rng,
                dropout_period,
                dropout_ratio,
                cost,
            )?;
            self.logger.log(format_args!("Training: Total Average Loss = {training_loss:.6}"));

            let validation_loss = match self.validation.as_mut() {
                Some(set) if set.size() > 0 => {
                    let loss = evaluation_pass(&mut self.network, &mut **set, cost, "validation")?;
                    self.logger.log(format_args!("Validation: Total Average Loss = {loss:.6}"));
                    Some(loss)
                }
                _ => None,
            };

            report.iterations = iteration;
            report.training_loss = training_loss;
            report.validation_loss = validation_loss;

            let stats = IterationStats {
                iteration,
                max_iterations: self.max_iterations,
                training_loss,
                validation_loss,
                elapsed_ms: t_start.elapsed().as_millis() as u64,
            };
            debug!("iteration {iteration}/{}: {stats:?}", self.max_iterations);

            if let Some(ref tx) = self.progress_tx {
                // If the receiver has been dropped, stop training.
                if tx.send(stats).is_err() {
                    report.cancelled = true;
                    break;
                }
            }

            let monitored = validation_loss.unwrap_or(training_loss);
            if let Some(prev) = previous {
                if (prev - monitored).abs() < self.tolerance {
                    report.converged = true;
                    break;
                }
            }
            previous = Some(monitored);
        }

        info!(
            "training stopped after {} iteration(s) (converged: {}, cancelled: {})",
            report.iterations, report.converged, report.cancelled
        );

        self.logger.log(format_args!("Evaluate the model with test set ..."));
        report.test_loss = evaluation_pass(&mut self.network, &mut *self.test, cost, "test")?;
        self.logger.log(format_args!("Evaluation: Total Average Loss = {:.6}", report.test_loss));

        Ok(report)
    }

    fn stop_requested(&self) -> bool {
        self.stop_flag.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }
}

/// One pass over `set` with a weight update after every datapoint.
/// Returns the running average loss.
fn training_pass<R: RngCore + ?Sized>(
    network: &mut Network,
    set: &mut dyn Dataset,
    optimizer: &Sgd,
    rng: &mut R,
    dropout_period: usize,
    dropout_ratio: f64,
    cost: CostFunction,
) -> Result<f64> {
    set.reset();
    let mut loss = 0.0;
    let mut index = 0;
    let mut masks: Vec<Option<Matrix>> = Vec::new();

    while let Some(point) = set.next() {
        if dropout_period > 0 && index % dropout_period == 0 {
            masks = select_masks(rng, network, dropout_ratio)?;
        }
        let sample_loss = backpropagate(network, optimizer, &point, &masks, cost)
            .map_err(|e| NetError::Datapoint { set: "training", index, source: Box::new(e) })?;
        loss += (sample_loss - loss) / (index + 1) as f64;
        index += 1;
    }

    Ok(loss)
}

/// Average loss over `set` without touching the parameters.
fn evaluation_pass(
    network: &mut Network,
    set: &mut dyn Dataset,
    cost: CostFunction,
    label: &'static str,
) -> Result<f64> {
    set.reset();
    let mut loss = 0.0;
    let mut index = 0;

    while let Some(point) = set.next() {
        let sample_loss = network
            .forward(&point.input)
            .and_then(|predicted| cost.loss(&predicted, &point.expected).map_err(|e| e.at_stage("deviation")))
            .map_err(|e| NetError::Datapoint { set: label, index, source: Box::new(e) })?;
        loss += (sample_loss - loss) / (index + 1) as f64;
        index += 1;
    }

    Ok(loss)
}

/// Forward pass, loss, then one gradient step per layer from the output back.
///
/// With `δ_l = ∂L/∂z_l`: the output error is `cost'` w.r.t. the prediction,
/// `∇W_l = δ_l · a_{l-1}ᵀ`, `∇b_l = δ_l` and `∂L/∂a_{l-1} = W_lᵀ · δ_l`,
/// taken before `W_l` is updated.
fn backpropagate(
    network: &mut Network,
    optimizer: &Sgd,
    point: &Datapoint,
    masks: &[Option<Matrix>],
    cost: CostFunction,
) -> Result<f64> {
    let trace = network.propagate(&point.input, masks)?;
    let last = trace.activations.len() - 1;
    let predicted = &trace.activations[last];

    let loss = cost.loss(predicted, &point.expected).map_err(|e| e.at_stage("deviation"))?;
    let mut error = cost.gradient(predicted, &point.expected).map_err(|e| e.at_stage("deviation"))?;

    for i in (0..=last).rev() {
        let layer = &network.layers()[i];
        let step = || -> Result<(Matrix, Matrix, Option<Matrix>)> {
            let mut delta = error.hadamard(&layer.activation_derivative(&trace.pre_activations[i])?)?;
            if let Some(mask) = masks.get(i).and_then(Option::as_ref) {
                delta = delta.hadamard(mask)?;
            }
            let prev = if i == 0 { &point.input } else { &trace.activations[i - 1] };
            let w_grad = delta.dot(&prev.transpose())?;
            let upstream = if i > 0 { Some(layer.weights.transpose().dot(&delta)?) } else { None };
            Ok((w_grad, delta, upstream))
        };
        let (w_grad, b_grad, upstream) = step().map_err(|e| e.at_stage("backward").at_layer(i))?;

        optimizer
            .step(&mut network.layers_mut()[i], &w_grad, &b_grad)
            .map_err(|e| e.at_stage("update").at_layer(i))?;

        if let Some(upstream) = upstream {
            error = upstream;
        }
    }

    Ok(loss)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activation::activation::ActivationFunction;
    use crate::layers::dense::LayerConfig;
    use crate::train::dataset::VecDataset;
    use crate::train::logger::MemoryLogger;
    use approx::assert_relative_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn forward_only(x: f64) -> f64 {
        x
    }

    /// Samples of y = 2x + 1.
    fn line() -> VecDataset {
        let xs = [-1.0, -0.5, 0.0, 0.5, 1.0];
        let inputs: Vec<Vec<f64>> = xs.iter().map(|&x| vec![x]).collect();
        let labels: Vec<Vec<f64>> = xs.iter().map(|&x| vec![2.0 * x + 1.0]).collect();
        VecDataset::from_samples(&inputs, &labels).unwrap()
    }

    fn linear_network() -> Network {
        let mut net = Network::new(1, true).unwrap();
        net.configure_layers(&[LayerConfig::new(1, ActivationFunction::Identity)]).unwrap();
        net
    }

    fn trainer<'a>(
        network: Network,
        logger: &'a mut MemoryLogger,
        max_iterations: usize,
        tolerance: f64,
    ) -> Result<Trainer<'a>> {
        Trainer::new(
            network,
            Box::new(logger),
            Box::new(line()),
            Some(Box::new(line())),
            Box::new(line()),
            max_iterations,
            tolerance,
        )
    }

    #[test]
    fn new_floors_iterations_and_abs_tolerance() {
        let mut logger = MemoryLogger::new();
        let t = trainer(linear_network(), &mut logger, 5, -0.25).unwrap();
        assert_eq!(t.max_iterations(), MIN_ITERATIONS);
        assert_eq!(t.tolerance(), 0.25);
    }

    #[test]
    fn empty_test_set_is_rejected() {
        let mut logger = MemoryLogger::new();
        let err = Trainer::new(
            linear_network(),
            Box::new(&mut logger),
            Box::new(line()),
            None,
            Box::new(VecDataset::default()),
            100,
            0.0,
        )
        .err()
        .unwrap();
        assert_eq!(err, NetError::InvalidTrainer("test set is empty".to_string()));
    }

    #[test]
    fn empty_training_set_is_rejected() {
        let mut logger = MemoryLogger::new();
        let err = Trainer::new(
            linear_network(),
            Box::new(&mut logger),
            Box::new(VecDataset::default()),
            None,
            Box::new(line()),
            100,
            0.0,
        )
        .err()
        .unwrap();
        assert_eq!(err, NetError::InvalidTrainer("training set is empty".to_string()));
    }

    #[test]
    fn unconfigured_network_is_rejected() {
        let mut logger = MemoryLogger::new();
        let err = trainer(Network::new(1, false).unwrap(), &mut logger, 100, 0.0).err().unwrap();
        assert!(matches!(err, NetError::InvalidTrainer(_)));
    }

    #[test]
    fn unusable_layer_is_reported_with_index() {
        let mut net = Network::new(1, false).unwrap();
        net.configure_layers(&[
            LayerConfig::new(2, ActivationFunction::Tanh),
            LayerConfig::new(1, ActivationFunction::Identity),
        ])
        .unwrap();
        net.layers_mut()[1].activator = ActivationFunction::forward_only(forward_only);

        let mut logger = MemoryLogger::new();
        let err = trainer(net, &mut logger, 100, 0.0).err().unwrap();
        match err {
            NetError::InvalidTrainer(msg) => assert!(msg.starts_with("layer [1]:"), "{msg}"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn dropout_ratio_is_bounded() {
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 20, 0.0).unwrap();
        let mut rng = StdRng::seed_from_u64(0);

        for ratio in [0.0, -0.1, 0.95, f64::NAN] {
            let err = t.train_with_backpropagation(&mut rng, 0, ratio, CostFunction::Squared).unwrap_err();
            assert!(matches!(err, NetError::InvalidDropoutRatio(_)));
        }
    }

    #[test]
    fn learns_a_line() {
        let mut logger = MemoryLogger::new();
        let report = {
            let mut t = trainer(linear_network(), &mut logger, 500, 1e-12)
                .unwrap()
                .with_optimizer(Sgd::new(0.05));
            let report = t
                .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
                .unwrap();

            let params = t.network().parameters();
            assert_relative_eq!(params[0], 2.0, epsilon = 1e-3);
            assert_relative_eq!(params[1], 1.0, epsilon = 1e-3);
            report
        };

        assert!(report.test_loss < 1e-5);
        assert!(report.validation_loss.is_some());
        assert!(!report.cancelled);
        assert!(logger.contains("Training: Total Average Loss"));
        assert!(logger.contains("Validation: Total Average Loss"));
        assert!(logger.contains("Evaluation: Total Average Loss"));
    }

    #[test]
    fn large_tolerance_converges_on_second_iteration() {
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 100, 10.0).unwrap().with_optimizer(Sgd::new(0.05));
        let report = t
            .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
            .unwrap();

        assert!(report.converged);
        assert_eq!(report.iterations, 2);
    }

    #[test]
    fn runs_to_the_cap_when_loss_is_flat() {
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 1, 0.0).unwrap().with_optimizer(Sgd::new(0.0));
        let report = t
            .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
            .unwrap();

        assert_eq!(report.iterations, MIN_ITERATIONS);
        assert!(!report.converged);
        // Zero parameters: the prediction is always 0, so the loss is mean((2x + 1)²).
        assert_relative_eq!(report.test_loss, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn stop_flag_skips_training_but_still_tests() {
        let flag = Arc::new(AtomicBool::new(true));
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 50, 0.0).unwrap().with_stop_flag(flag);
        let report = t
            .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
            .unwrap();

        assert!(report.cancelled);
        assert_eq!(report.iterations, 0);
        assert_relative_eq!(report.test_loss, 3.0, epsilon = 1e-12);
    }

    #[test]
    fn progress_receives_every_iteration() {
        let (tx, rx) = mpsc::channel();
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 25, 0.0).unwrap().with_progress(tx);
        let report = t
            .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
            .unwrap();
        drop(t);

        let stats: Vec<IterationStats> = rx.iter().collect();
        assert_eq!(stats.len(), report.iterations);
        assert_eq!(stats.last().unwrap().iteration, report.iterations);
        assert!(stats.iter().all(|s| s.validation_loss.is_some()));
    }

    #[test]
    fn dropout_training_is_reproducible() {
        let run = |seed: u64| {
            let mut net = Network::new(1, false).unwrap();
            net.configure_layers(&[
                LayerConfig::new(6, ActivationFunction::Tanh),
                LayerConfig::new(1, ActivationFunction::Identity),
            ])
            .unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            net.randomize(&mut rng).unwrap();

            let mut logger = MemoryLogger::new();
            let mut t = trainer(net, &mut logger, 30, 0.0).unwrap().with_optimizer(Sgd::new(0.01));
            let report = t.train_with_backpropagation(&mut rng, 2, 0.5, CostFunction::Squared).unwrap();
            (report, t.into_network().parameters())
        };

        let (report_a, params_a) = run(11);
        let (report_b, params_b) = run(11);
        assert_eq!(report_a, report_b);
        assert_eq!(params_a, params_b);
        assert!(report_a.training_loss.is_finite());
    }

    #[test]
    fn datapoint_shape_errors_name_the_set_and_index() {
        let bad = VecDataset::from_samples(&[vec![1.0, 2.0]], &[vec![0.0]]).unwrap();
        let mut logger = MemoryLogger::new();
        let mut t = Trainer::new(
            linear_network(),
            Box::new(&mut logger),
            Box::new(bad),
            None,
            Box::new(line()),
            20,
            0.0,
        )
        .unwrap();

        let err = t
            .train_with_backpropagation(&mut StdRng::seed_from_u64(1), 0, 0.5, CostFunction::Squared)
            .unwrap_err();
        assert!(matches!(err, NetError::Datapoint { set: "training", index: 0, .. }));
        assert!(matches!(err.root(), NetError::ShapeMismatch { op: "dot", .. }));
    }

    /// 3 -> 4 (Tanh) -> 2 (Sigmoid) with seeded non-zero weights and biases.
    fn two_layer_network() -> Network {
        use rand::Rng;

        let mut net = Network::new(3, false).unwrap();
        net.configure_layers(&[
            LayerConfig::new(4, ActivationFunction::Tanh),
            LayerConfig::new(2, ActivationFunction::Sigmoid),
        ])
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let params: Vec<f64> = (0..net.parameter_count()).map(|_| rng.gen_range(-1.0..1.0)).collect();
        net.load_parameters(&params).unwrap();
        net
    }

    /// Gradient applied by one `backpropagate` step at unit learning rate.
    fn applied_gradient(network: &Network, point: &Datapoint, masks: &[Option<Matrix>]) -> Vec<f64> {
        let mut stepped = network.clone();
        backpropagate(&mut stepped, &Sgd::new(1.0), point, masks, CostFunction::Squared).unwrap();
        network
            .parameters()
            .iter()
            .zip(stepped.parameters())
            .map(|(before, after)| before - after)
            .collect()
    }

    /// Central-difference gradient of the masked forward loss.
    fn numeric_gradient(network: &Network, point: &Datapoint, masks: &[Option<Matrix>]) -> Vec<f64> {
        let h = 1e-6;
        let base = network.parameters();
        let mut shifted = network.clone();
        let mut grad = Vec::with_capacity(base.len());

        for k in 0..base.len() {
            let mut losses = [0.0; 2];
            for (loss, offset) in losses.iter_mut().zip([h, -h]) {
                let mut params = base.clone();
                params[k] += offset;
                shifted.load_parameters(&params).unwrap();
                let trace = shifted.propagate(&point.input, masks).unwrap();
                *loss = CostFunction::Squared.loss(&trace.activations[1], &point.expected).unwrap();
            }
            grad.push((losses[0] - losses[1]) / (2.0 * h));
        }
        grad
    }

    fn gradient_point() -> Datapoint {
        Datapoint::new(
            Matrix::column(&[0.3, -0.7, 0.5]).unwrap(),
            Matrix::column(&[0.2, 0.9]).unwrap(),
        )
    }

    #[test]
    fn backpropagation_matches_finite_differences() {
        let net = two_layer_network();
        let point = gradient_point();

        let analytic = applied_gradient(&net, &point, &[]);
        let numeric = numeric_gradient(&net, &point, &[]);

        assert_eq!(analytic.len(), 4 * 4 + 2 * 5);
        assert!(analytic.iter().any(|g| g.abs() > 1e-4));
        for (a, n) in analytic.iter().zip(&numeric) {
            assert_relative_eq!(*a, *n, epsilon = 1e-7);
        }
    }

    #[test]
    fn masked_backpropagation_matches_finite_differences() {
        let net = two_layer_network();
        let point = gradient_point();
        let masks = vec![Some(Matrix::column(&[2.0, 0.0, 2.0, 0.0]).unwrap()), None];

        let analytic = applied_gradient(&net, &point, &masks);
        let numeric = numeric_gradient(&net, &point, &masks);

        for (a, n) in analytic.iter().zip(&numeric) {
            assert_relative_eq!(*a, *n, epsilon = 1e-7);
        }
        // Dropped hidden neurons 1 and 3 get no weight or bias update.
        for neuron in [1, 3] {
            assert!(analytic[neuron * 4..neuron * 4 + 4].iter().all(|&g| g == 0.0));
        }
        assert_ne!(analytic, applied_gradient(&net, &point, &[]));
    }

    #[test]
    fn train_applies_config() {
        let mut logger = MemoryLogger::new();
        let mut t = trainer(linear_network(), &mut logger, 20, 0.0).unwrap();
        let config = TrainConfig { learning_rate: 0.0, ..TrainConfig::default() };

        let report = t.train(&mut StdRng::seed_from_u64(1), &config).unwrap();
        assert_relative_eq!(report.training_loss, 3.0, epsilon = 1e-12);
    }
}
