use mlp_estimator::{Activation, Init, Matrix, MlpClassifier, Solver};
use tracing_subscriber::EnvFilter;

fn main() -> mlp_estimator::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Classic XOR dataset.
    let x = Matrix::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ])?;
    let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]])?;

    // 2 -> 4 -> 1 network: ReLU hidden layer, logistic output (forced by the log loss).
    let mut clf = MlpClassifier::new(vec![4], Activation::ReLU, Solver::adam().with_lr(0.05), 0.0);
    clf.config_mut().epochs = 2_000;
    clf.config_mut().init = Init::Xavier;
    clf.config_mut().seed = Some(6);

    let report = clf.fit(&x, &y)?;
    println!(
        "first_loss={} final_loss={}",
        report.first_loss, report.final_loss
    );

    let proba = clf.predict_proba(&x)?;
    let labels = clf.predict(&x)?;
    for r in 0..x.rows() {
        println!("x={:?} p={:.4} label={}", x.row(r), proba.get(r, 0), labels.get(r, 0));
    }
    println!("accuracy={}", clf.score(&x, &y)?);

    Ok(())
}
