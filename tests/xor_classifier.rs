use mlp_estimator::{Activation, Init, Loss, Matrix, MlpClassifier, Solver};

fn xor() -> (Matrix, Matrix) {
    let x = Matrix::from_rows(&[
        vec![0.0, 0.0],
        vec![0.0, 1.0],
        vec![1.0, 0.0],
        vec![1.0, 1.0],
    ])
    .unwrap();
    let y = Matrix::from_rows(&[vec![0.0], vec![1.0], vec![1.0], vec![0.0]]).unwrap();
    (x, y)
}

fn classifier() -> MlpClassifier {
    let mut clf = MlpClassifier::new(
        vec![4],
        Activation::ReLU,
        Solver::adam().with_lr(0.05),
        0.0,
    );
    let cfg = clf.config_mut();
    cfg.epochs = 2_000;
    cfg.init = Init::Xavier;
    cfg.seed = Some(6);
    clf
}

#[test]
fn relu_network_learns_xor() {
    let (x, y) = xor();
    let mut clf = classifier();
    assert_eq!(clf.config().loss, Loss::Log);

    let report = clf.fit(&x, &y).unwrap();
    assert_eq!(report.batch_size, 4);
    assert!(report.final_loss < report.first_loss);

    let net = clf.network().unwrap();
    assert_eq!(net.layers()[0].activation(), Activation::ReLU);
    assert_eq!(net.layers()[1].activation(), Activation::Logistic);

    assert_eq!(clf.predict(&x).unwrap(), y);
    assert_eq!(clf.score(&x, &y).unwrap(), 1.0);
}

#[test]
fn refit_discards_previous_network() {
    let (x, y) = xor();
    let mut clf = classifier();
    clf.config_mut().epochs = 5;
    clf.fit(&x, &y).unwrap();
    let first = clf.network().unwrap().params().to_vec();

    // Same seed, same data: the second fit starts from the same initial weights.
    clf.fit(&x, &y).unwrap();
    assert_eq!(clf.network().unwrap().params(), first.as_slice());
}
