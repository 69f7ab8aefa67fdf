use mlp_estimator::{Activation, Matrix, MlpConfig, MlpRegressor, Solver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing_subscriber::EnvFilter;

fn main() -> mlp_estimator::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // y = 1 + 3 a - 2 b + small noise
    let mut rng = StdRng::seed_from_u64(0);
    let n = 500;
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for _ in 0..n {
        let a: f64 = rng.gen_range(-1.0..1.0);
        let b: f64 = rng.gen_range(-1.0..1.0);
        xs.extend([a, b]);
        ys.push(1.0 + 3.0 * a - 2.0 * b + rng.gen_range(-0.01..0.01));
    }
    let x = Matrix::from_flat(xs, 2)?;
    let y = Matrix::from_flat(ys, 1)?;

    // No hidden layer and an identity activation: plain linear regression.
    let mut cfg = MlpConfig::new(vec![], Activation::Identity, Solver::sgd(0.002), 0.0);
    cfg.epochs = 100;
    cfg.mini_batch_size = 25;
    cfg.seed = Some(1);

    let mut reg = MlpRegressor::with_config(cfg);
    let report = reg.fit(&x, &y)?;
    for (epoch, loss) in report.losses.iter().enumerate().step_by(10) {
        println!("epoch={epoch} loss={loss:.6}");
    }

    if let Some(net) = reg.network() {
        println!("[bias, coef_a, coef_b] = {:?}", net.params());
    }
    println!("r2={}", reg.score(&x, &y)?);
    Ok(())
}
