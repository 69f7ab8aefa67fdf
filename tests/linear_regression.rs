use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use mlp_estimator::{Activation, Loss, Matrix, MlpConfig, MlpRegressor, Solver};

const COEF: [f64; 2] = [2.0, -3.0];
const INTERCEPT: f64 = 0.5;

fn linear_dataset(n: usize, seed: u64) -> (Matrix, Matrix) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut xs = Vec::with_capacity(n * 2);
    let mut ys = Vec::with_capacity(n);
    for _ in 0..n {
        let a = rng.gen_range(-1.0..1.0);
        let b = rng.gen_range(-1.0..1.0);
        xs.extend([a, b]);
        ys.push(INTERCEPT + COEF[0] * a + COEF[1] * b);
    }
    (
        Matrix::from_flat(xs, 2).unwrap(),
        Matrix::from_flat(ys, 1).unwrap(),
    )
}

fn linear_config(solver: Solver, epochs: usize) -> MlpConfig {
    let mut cfg = MlpConfig::new(vec![], Activation::Identity, solver, 0.0);
    cfg.epochs = epochs;
    cfg.mini_batch_size = 10;
    cfg.seed = Some(42);
    cfg
}

#[test]
fn single_layer_identity_network_recovers_least_squares_fit() {
    let (x, y) = linear_dataset(100, 1);
    let cfg = linear_config(Solver::sgd(0.005), 200);
    assert_eq!(cfg.loss, Loss::Square);

    let mut reg = MlpRegressor::with_config(cfg);
    let report = reg.fit(&x, &y).unwrap();

    assert_eq!(report.batch_size, 10);
    assert!(report.final_loss <= report.first_loss);
    assert!(report.final_loss < 1e-8, "final loss {}", report.final_loss);

    // Loss falls epoch over epoch; compare every 10th epoch to ride over shuffle noise.
    let checkpoints: Vec<f64> = report.losses.iter().step_by(10).take(6).copied().collect();
    for pair in checkpoints.windows(2) {
        assert!(pair[1] <= pair[0], "loss went up: {checkpoints:?}");
    }

    // The only layer's weights are [bias; coef], so they are the least-squares solution.
    let params = reg.network().unwrap().params();
    assert_abs_diff_eq!(params[0], INTERCEPT, epsilon = 1e-4);
    assert_abs_diff_eq!(params[1], COEF[0], epsilon = 1e-4);
    assert_abs_diff_eq!(params[2], COEF[1], epsilon = 1e-4);

    let (x_test, y_test) = linear_dataset(20, 2);
    assert!(reg.score(&x_test, &y_test).unwrap() > 0.9999);
}

#[test]
fn every_solver_reduces_the_training_loss() {
    let (x, y) = linear_dataset(100, 3);
    let solvers = [
        Solver::sgd(0.005),
        Solver::agd(),
        Solver::adagrad(),
        Solver::rmsprop(),
        Solver::adadelta(),
        Solver::adam(),
    ];

    for solver in solvers {
        let mut reg = MlpRegressor::with_config(linear_config(solver, 50));
        let report = reg.fit(&x, &y).unwrap();
        assert!(
            report.final_loss < report.first_loss,
            "{solver:?}: {} !< {}",
            report.final_loss,
            report.first_loss
        );
    }
}

#[test]
fn regularization_shrinks_weights() {
    let (x, y) = linear_dataset(100, 4);

    let mut plain = MlpRegressor::with_config(linear_config(Solver::sgd(0.005), 100));
    plain.fit(&x, &y).unwrap();

    let mut cfg = linear_config(Solver::sgd(0.005), 100);
    cfg.alpha = 50.0;
    let mut ridge = MlpRegressor::with_config(cfg);
    ridge.fit(&x, &y).unwrap();

    let norm = |r: &MlpRegressor| {
        r.network().unwrap().params()[1..]
            .iter()
            .map(|w| w * w)
            .sum::<f64>()
    };
    assert!(norm(&ridge) < norm(&plain));
}

#[test]
fn hidden_tanh_network_fits_a_smooth_target() {
    let mut rng = StdRng::seed_from_u64(9);
    let n = 200;
    let mut xs = Vec::with_capacity(n);
    let mut ys = Vec::with_capacity(n);
    for _ in 0..n {
        let a: f64 = rng.gen_range(-2.0..2.0);
        xs.push(a);
        ys.push(a.sin());
    }
    let x = Matrix::from_flat(xs, 1).unwrap();
    let y = Matrix::from_flat(ys, 1).unwrap();

    let mut cfg = MlpConfig::new(vec![16], Activation::Tanh, Solver::adam().with_lr(0.01), 0.0);
    cfg.loss = Loss::Square;
    cfg.epochs = 300;
    cfg.mini_batch_size = 20;
    cfg.seed = Some(0);
    cfg.gradient_clipping = 10.0;
    cfg.check_finite = true;

    let mut reg = MlpRegressor::with_config(cfg);
    let report = reg.fit(&x, &y).unwrap();
    assert!(report.final_loss < 0.1 * report.first_loss);
    assert!(reg.score(&x, &y).unwrap() > 0.9);
}
