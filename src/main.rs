// Trains a small network on XOR and prints its predictions.
// Log verbosity follows RUST_LOG (defaults to `info`); per-iteration losses
// are logged at debug level.
use ffnet::{
    ActivationFunction, LayerConfig, LogSink, Matrix, Network, TrainConfig, Trainer, VecDataset,
};
use rand::{rngs::StdRng, SeedableRng};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let inputs = vec![
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![0.0, 1.0],
        vec![0.0, 0.0],
    ];
    let expected_outputs = vec![
        vec![1.0],
        vec![0.0],
        vec![1.0],
        vec![0.0],
    ];

    let mut rng = StdRng::seed_from_u64(7);

    let mut network = Network::new(2, true)?;
    network.configure_layers(&[
        LayerConfig::new(4, ActivationFunction::Sigmoid),
        LayerConfig::new(1, ActivationFunction::Sigmoid),
    ])?;
    network.randomize(&mut rng)?;

    let mut trainer = Trainer::new(
        network,
        Box::new(LogSink::new(log::Level::Debug)),
        Box::new(VecDataset::from_samples(&inputs, &expected_outputs)?),
        None,
        Box::new(VecDataset::from_samples(&inputs, &expected_outputs)?),
        5000,
        1e-9,
    )?;

    let report = trainer.train(&mut rng, &TrainConfig::default())?;
    println!(
        "{} iteration(s), training loss {:.6}, test loss {:.6}, converged: {}",
        report.iterations, report.training_loss, report.test_loss, report.converged
    );

    let mut network = trainer.into_network();
    for input in &inputs {
        let output = network.forward(&Matrix::column(input)?)?;
        println!("Input: {:?} -> Output: {:.4}", input, output.get(0, 0));
    }

    Ok(())
}
