//! End-to-end visualization tests.
//!
//! These run the full loop — tap attachment, stochastic transforms, forward
//! pass, objective evaluation, backward pass, Adam pixel update — against a
//! small frozen CNN built from constant tensors.

use candle_core::{Device, Tensor, Var};
use candle_nn::{Conv2d, Conv2dConfig, Linear};
use featviz_rs::{
    maximize, ChannelObjective, Flatten, InspectableModel, LayeredModel, MaximizeConfig, Relu,
    TransformPipeline, VizError,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const HEIGHT: usize = 8;
const WIDTH: usize = 8;
const CONV_CHANNELS: usize = 4;
const CLASSES: usize = 10;

/// Deterministic pseudo-random weight data.
fn weight_data(rng: &mut StdRng, len: usize) -> Vec<f32> {
    (0..len).map(|_| rng.gen_range(-0.5..0.5)).collect()
}

/// Frozen toy CNN: conv(3->4, 3x3, pad 1) -> relu -> flatten -> fc(-> 10).
///
/// Every weight is a plain Tensor, so candle never accumulates gradients
/// into the model; only the image Var is trainable.
fn toy_cnn() -> LayeredModel {
    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(42);

    let conv_weight = Tensor::from_vec(
        weight_data(&mut rng, CONV_CHANNELS * 3 * 3 * 3),
        (CONV_CHANNELS, 3, 3, 3),
        &device,
    )
    .unwrap();
    let conv_cfg = Conv2dConfig {
        padding: 1,
        ..Default::default()
    };

    let fc_in = CONV_CHANNELS * HEIGHT * WIDTH;
    let fc_weight = Tensor::from_vec(
        weight_data(&mut rng, CLASSES * fc_in),
        (CLASSES, fc_in),
        &device,
    )
    .unwrap();

    LayeredModel::new()
        .push("conv1", Box::new(Conv2d::new(conv_weight, None, conv_cfg)))
        .unwrap()
        .push("relu1", Box::new(Relu))
        .unwrap()
        .push("flatten", Box::new(Flatten))
        .unwrap()
        .push("fc", Box::new(Linear::new(fc_weight, None)))
        .unwrap()
}

fn seed_image(seed: u64) -> Var {
    let mut rng = StdRng::seed_from_u64(seed);
    let data: Vec<f32> = (0..3 * HEIGHT * WIDTH)
        .map(|_| rng.gen_range(0.4..0.6))
        .collect();
    Var::from_tensor(&Tensor::from_vec(data, (1, 3, HEIGHT, WIDTH), &Device::Cpu).unwrap())
        .unwrap()
}

/// Current objective value for a layer/channel, via a fresh forward pass.
fn objective_value(model: &LayeredModel, image: &Var, layer: &str, channel: usize) -> f32 {
    let tap = model.attach(layer).unwrap();
    model.forward(image.as_tensor()).unwrap();
    ChannelObjective::new(layer, channel)
        .evaluate(&tap)
        .unwrap()
        .to_scalar::<f32>()
        .unwrap()
}

#[test]
fn output_class_run_changes_image_and_keeps_shape() {
    // Final fully-connected layer, one class channel, identity transform,
    // one iteration, fixed seed: the gradient step must move the pixels.
    let model = toy_cnn();
    let image = seed_image(0);
    let before: Vec<f32> = image.as_tensor().flatten_all().unwrap().to_vec1().unwrap();

    let result = maximize(
        &model,
        &image,
        "fc",
        9,
        &TransformPipeline::identity(),
        &MaximizeConfig::default().with_iterations(1).with_seed(0),
    )
    .unwrap();

    assert_eq!(result.dims(), &[1, 3, HEIGHT, WIDTH]);
    let after: Vec<f32> = result.flatten_all().unwrap().to_vec1().unwrap();
    assert_ne!(before, after);
}

#[test]
fn identity_transform_strictly_improves_objective() {
    // Tapping the first conv layer makes the objective linear in the pixels,
    // so every early Adam step with a small learning rate strictly lowers the
    // loss. Step one iteration at a time and check the whole trajectory.
    let model = toy_cnn();
    let image = seed_image(1);
    let config = MaximizeConfig::default()
        .with_iterations(1)
        .with_learning_rate(0.01)
        .with_seed(7);

    let mut losses = vec![objective_value(&model, &image, "conv1", 1)];
    for _ in 0..5 {
        maximize(
            &model,
            &image,
            "conv1",
            1,
            &TransformPipeline::identity(),
            &config,
        )
        .unwrap();
        losses.push(objective_value(&model, &image, "conv1", 1));
    }

    for pair in losses.windows(2) {
        assert!(
            pair[1] < pair[0],
            "loss must strictly decrease each step: {losses:?}"
        );
    }
}

#[test]
fn imagenet_geometry_run_changes_image_and_keeps_shape() {
    // Full 224x224 input geometry, shape-only: one iteration through a conv
    // tap must mutate the pixels and return the input shape unchanged.
    let device = Device::Cpu;
    let mut rng = StdRng::seed_from_u64(21);

    let conv_cfg = Conv2dConfig {
        padding: 1,
        ..Default::default()
    };
    let conv_weight = Tensor::from_vec(
        weight_data(&mut rng, CONV_CHANNELS * 3 * 3 * 3),
        (CONV_CHANNELS, 3, 3, 3),
        &device,
    )
    .unwrap();
    let model = LayeredModel::new()
        .push("conv1", Box::new(Conv2d::new(conv_weight, None, conv_cfg)))
        .unwrap()
        .push("relu1", Box::new(Relu))
        .unwrap();

    let data: Vec<f32> = (0..3 * 224 * 224).map(|_| rng.gen_range(0.4..0.6)).collect();
    let image =
        Var::from_tensor(&Tensor::from_vec(data, (1, 3, 224, 224), &device).unwrap()).unwrap();
    let before: Vec<f32> = image.as_tensor().flatten_all().unwrap().to_vec1().unwrap();

    let result = maximize(
        &model,
        &image,
        "conv1",
        0,
        &TransformPipeline::identity(),
        &MaximizeConfig::default().with_iterations(1).with_seed(0),
    )
    .unwrap();

    assert_eq!(result.dims(), &[1, 3, 224, 224]);
    let after: Vec<f32> = result.flatten_all().unwrap().to_vec1().unwrap();
    assert_ne!(before, after);
}

#[test]
fn transformed_run_completes_and_preserves_shape() {
    let model = toy_cnn();
    let image = seed_image(2);

    let pipeline = TransformPipeline::standard(2, 30.0, (0.9, 1.2));
    let result = maximize(
        &model,
        &image,
        "conv1",
        0,
        &pipeline,
        &MaximizeConfig::default().with_iterations(15).with_seed(11),
    )
    .unwrap();

    assert_eq!(result.dims(), &[1, 3, HEIGHT, WIDTH]);
}

#[test]
fn transformed_run_improves_objective_over_start() {
    // With stochastic transforms the per-step trajectory is noisy, but over a
    // short run at a modest learning rate the objective still improves.
    let model = toy_cnn();
    let image = seed_image(3);

    let before = objective_value(&model, &image, "conv1", 2);
    maximize(
        &model,
        &image,
        "conv1",
        2,
        &TransformPipeline::new()
            .then(featviz_rs::Jitter::new(1)),
        &MaximizeConfig::default()
            .with_iterations(30)
            .with_learning_rate(0.02)
            .with_seed(13),
    )
    .unwrap();
    let after = objective_value(&model, &image, "conv1", 2);

    assert!(
        after < before,
        "objective should improve despite jitter: before={before}, after={after}"
    );
}

#[test]
fn convolutional_channel_objective_matches_manual_mean() {
    // Rank-4 projection: negative mean over all spatial positions of the
    // selected channel.
    let model = toy_cnn();
    let image = seed_image(4);

    let tap = model.attach("conv1").unwrap();
    model.forward(image.as_tensor()).unwrap();
    let activation = tap.latest().unwrap();

    let channel = 3;
    let loss = ChannelObjective::new("conv1", channel)
        .evaluate(&tap)
        .unwrap()
        .to_scalar::<f32>()
        .unwrap();

    let slice: Vec<f32> = activation
        .narrow(1, channel, 1)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    #[allow(clippy::cast_precision_loss)]
    let manual_mean = slice.iter().sum::<f32>() / slice.len() as f32;

    assert!((loss + manual_mean).abs() < 1e-6);
}

#[test]
fn channel_out_of_range_surfaces_after_first_forward() {
    let model = toy_cnn();
    let image = seed_image(5);

    // Attach succeeds: the bad channel is only detectable once the first
    // forward pass reveals the activation width.
    let err = maximize(
        &model,
        &image,
        "fc",
        CLASSES,
        &TransformPipeline::identity(),
        &MaximizeConfig::default().with_seed(0),
    )
    .unwrap_err();

    assert!(matches!(
        err,
        VizError::ChannelIndexOutOfRange { channel, width, .. }
            if channel == CLASSES && width == CLASSES
    ));
}

#[test]
fn unknown_layer_fails_before_any_iteration() {
    let model = toy_cnn();
    let image = seed_image(6);
    let before: Vec<f32> = image.as_tensor().flatten_all().unwrap().to_vec1().unwrap();

    let err = maximize(
        &model,
        &image,
        "mixed4a",
        0,
        &TransformPipeline::identity(),
        &MaximizeConfig::default(),
    )
    .unwrap_err();

    assert!(matches!(err, VizError::LayerNotFound(_)));
    // No iteration ran: the image is untouched.
    let after: Vec<f32> = image.as_tensor().flatten_all().unwrap().to_vec1().unwrap();
    assert_eq!(before, after);
}

#[test]
fn completed_run_leaves_model_uninstrumented() {
    let model = toy_cnn();
    let image = seed_image(7);

    maximize(
        &model,
        &image,
        "conv1",
        0,
        &TransformPipeline::identity(),
        &MaximizeConfig::default().with_iterations(2).with_seed(0),
    )
    .unwrap();

    // The run's tap was released on exit; a later forward pass records into
    // nothing. A freshly attached tap only sees passes made after it.
    model.forward(image.as_tensor()).unwrap();
    let fresh = model.attach("conv1").unwrap();
    assert!(fresh.latest().is_err());
    model.forward(image.as_tensor()).unwrap();
    assert!(fresh.latest().is_ok());
}

#[test]
fn repeated_runs_on_same_model_are_independent() {
    let model = toy_cnn();

    for channel in 0..CONV_CHANNELS {
        let image = seed_image(8);
        let result = maximize(
            &model,
            &image,
            "conv1",
            channel,
            &TransformPipeline::identity(),
            &MaximizeConfig::default().with_iterations(3).with_seed(0),
        )
        .unwrap();
        assert_eq!(result.dims(), &[1, 3, HEIGHT, WIDTH]);
    }
}

#[test]
fn fixed_seed_runs_are_reproducible() {
    let model = toy_cnn();
    let pipeline = TransformPipeline::standard(2, 30.0, (0.9, 1.2));
    let config = MaximizeConfig::default().with_iterations(5).with_seed(99);

    let first: Vec<f32> = maximize(&model, &seed_image(9), "conv1", 1, &pipeline, &config)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();
    let second: Vec<f32> = maximize(&model, &seed_image(9), "conv1", 1, &pipeline, &config)
        .unwrap()
        .flatten_all()
        .unwrap()
        .to_vec1()
        .unwrap();

    assert_eq!(first, second);
}
