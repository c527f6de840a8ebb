use std::fs::File;
use std::io::Write;

use convfit::architecture::cifar10_cnn;
use convfit::baseline::NearestCentroid;
use convfit::dataset::{self, Split, IMAGE_BYTES};
use convfit::epoch_limiter::EpochLimiter;
use convfit::{evaluate, fit, EachEpoch, TrainingOptions};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tempfile::tempdir;
mod util;
use util::TestObserver;

/// write `count` records per file whose pixels cluster around a brightness determined by the label
fn write_split(dir: &std::path::Path, split: Split, count: usize, rng: &mut StdRng) {
    for file_name in split.file_names() {
        let mut file = File::create(dir.join(file_name)).unwrap();
        for i in 0..count {
            let label = (i % 10) as u8;
            let base = label as i32 * 25;
            let mut record = vec![label];
            record.extend((0..IMAGE_BYTES).map(|_| (base + rng.gen_range(-8..=8)).clamp(0, 255) as u8));
            file.write_all(&record).unwrap();
        }
    }
}

/// Load a synthetic CIFAR-10 directory, train the baseline with the stop-at-epoch-4 setup, and check it beats chance on the test split
#[test]
fn train_baseline_on_synthetic_cifar() {
    let dir = tempdir().unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    write_split(dir.path(), Split::Train, 40, &mut rng);
    write_split(dir.path(), Split::Test, 50, &mut rng);

    let training_data = dataset::normalize(&dataset::load_split(dir.path(), Split::Train, None).unwrap());
    let test_data = dataset::normalize(&dataset::load_split(dir.path(), Split::Test, None).unwrap());
    assert_eq!(training_data.len(), 200);
    assert_eq!(test_data.len(), 50);
    assert!(training_data
        .iter()
        .all(|sample| sample.features().iter().all(|&x| (0.0..=1.0).contains(&x))));

    let architecture = cifar10_cnn().unwrap();
    let mut model = NearestCentroid::new(
        architecture.input_shape().len(),
        architecture.output_shape().len(),
        0.01,
    );
    let limiter = EpochLimiter::new(4);
    let history = fit(
        &mut model,
        &training_data,
        EachEpoch::ValidateModel(&test_data),
        &[&TestObserver::new(), &limiter],
        &TrainingOptions {
            num_epochs: 10,
            batch_size: 60,
            shuffle: true,
            seed: Some(3),
        },
    )
    .unwrap();
    assert_eq!(history.len(), 5);

    let evaluation = evaluate(&model, &test_data, 60).unwrap();
    println!("Test accuracy: {}", evaluation.accuracy);
    assert!(
        evaluation.accuracy > 0.9,
        "accuracy {} on well separated classes",
        evaluation.accuracy
    );
    assert_eq!(history.val_accuracy().last().copied(), Some(evaluation.accuracy));
}
