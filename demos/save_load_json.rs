#[cfg(not(feature = "serde"))]
fn main() {
    println!("enable the `serde` feature: cargo run --example save_load_json --features serde");
}

#[cfg(feature = "serde")]
fn main() -> mlp_estimator::Result<()> {
    use mlp_estimator::{Activation, Loss, Matrix, MlpConfig, MlpRegressor};
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = MlpConfig::from_json_str(
        r#"{
            "hidden_layer_sizes": [8],
            "activation": "tanh",
            "solver": {"kind": "adam", "lr": 0.01, "beta1": 0.9, "beta2": 0.999, "eps": 1e-8},
            "loss": "square",
            "init": "xavier",
            "epochs": 500,
            "seed": 0
        }"#,
    )?;
    assert_eq!((cfg.activation, cfg.loss), (Activation::Tanh, Loss::Square));

    let x = Matrix::from_rows(&[vec![-1.0], vec![-0.5], vec![0.0], vec![0.5], vec![1.0]])?;
    let y = Matrix::from_rows(&[vec![0.8], vec![0.2], vec![0.0], vec![0.2], vec![0.8]])?;

    let mut reg = MlpRegressor::with_config(cfg);
    reg.fit(&x, &y)?;

    let path = std::env::temp_dir().join("mlp_estimator_demo.json");
    reg.save_json(&path)?;

    let mut loaded = MlpRegressor::load_json(&path)?;
    assert_eq!(loaded.predict(&x)?, reg.predict(&x)?);
    println!("saved and loaded model: {}", path.display());
    Ok(())
}
