use crate::data::Reading;
use rand::prelude::*;
use rand::seq::index;
use rand_distr::Normal;

/// Spacing of generated readings (50 Hz).
pub const SAMPLE_STEP_SECONDS: f64 = 0.02;

/// Generate `n` labelled readings: slow sinusoidal accelerometer and gyroscope
/// motion with gaussian noise, a near-constant lidar range, and
/// `floor(n * anomaly_rate)` rows whose `accel_x` is pushed up by about 3 units.
pub fn make_dataset(n: usize, anomaly_rate: f64, seed: Option<u64>) -> Vec<Reading> {
    let mut rng = match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };
    // constant, valid parameters
    let accel_noise = Normal::new(0.0, 0.05).unwrap();
    let gyro_noise = Normal::new(0.0, 0.03).unwrap();
    let lidar_noise = Normal::new(0.0, 0.01).unwrap();
    let spike = Normal::new(3.0, 0.5).unwrap();

    let mut readings: Vec<Reading> = (0..n)
        .map(|i| {
            let t = i as f64 * SAMPLE_STEP_SECONDS;
            let accel = 0.5 * (0.2 * t).sin();
            let gyro = 0.3 * (0.15 * t).cos();
            let values = [
                accel + accel_noise.sample(&mut rng),
                accel + accel_noise.sample(&mut rng),
                accel + accel_noise.sample(&mut rng),
                gyro + gyro_noise.sample(&mut rng),
                gyro + gyro_noise.sample(&mut rng),
                gyro + gyro_noise.sample(&mut rng),
                1.0 + lidar_noise.sample(&mut rng),
            ];
            Reading::new(t, values).with_label(false)
        })
        .collect();

    let n_anomalies = ((n as f64 * anomaly_rate.clamp(0.0, 1.0)).floor() as usize).min(n);
    for idx in index::sample(&mut rng, n, n_anomalies) {
        let r = &mut readings[idx];
        r.values[0] += spike.sample(&mut rng);
        r.is_anomaly = Some(true);
    }
    readings
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_and_flags() {
        let data = make_dataset(1000, 0.05, Some(123));
        assert_eq!(data.len(), 1000);
        assert_eq!(data.iter().filter(|r| r.is_anomaly == Some(true)).count(), 50);
        assert!(data.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn seeded_generation_is_reproducible() {
        assert_eq!(make_dataset(200, 0.01, Some(9)), make_dataset(200, 0.01, Some(9)));
    }
}
