criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        training_dense_epoch,
        predicting_dense_row,
        training_sparse_epoch,
        predicting_sparse_row,
        predicting_stateless_row,
        cross_loading_dense_into_sparse,
}

use tsetlin_engine::{DenseEngine, Hyperparams, Params, Prng, SparseEngine, StatelessEngine};

fn bench_params() -> Params {
    Params::new(Hyperparams {
        num_classes: 2,
        threshold: 15,
        num_literals: 64,
        num_clauses: 100,
        max_state: 127,
        min_state: -127,
        boost_true_positive_feedback: false,
        s: 3.0,
        y_size: 1,
        y_element_size: 4,
    })
    .unwrap()
}

fn random_rows(seed: u32, rows: usize, literals: usize) -> (Vec<u8>, Vec<u8>) {
    let mut rng = Prng::new(seed);
    let mut x = Vec::with_capacity(rows * literals);
    let mut y = Vec::with_capacity(rows * 4);
    for _ in 0..rows {
        for _ in 0..literals {
            x.push((rng.next_f32() < 0.5) as u8);
        }
        y.extend_from_slice(&((rng.next_f32() < 0.5) as u32).to_le_bytes());
    }
    (x, y)
}

fn training_dense_epoch(c: &mut criterion::Criterion) {
    let params = bench_params();
    let (x, y) = random_rows(1, 500, params.num_literals());
    c.bench_function("train Dense engine for one epoch (500 rows)", |b| {
        b.iter(|| {
            let mut engine = DenseEngine::create(params, 1).unwrap();
            engine.train(&x, &y, 500, 1).unwrap();
        })
    });
}

fn predicting_dense_row(c: &mut criterion::Criterion) {
    let params = bench_params();
    let (x, y) = random_rows(2, 200, params.num_literals());
    let mut engine = DenseEngine::create(params, 2).unwrap();
    engine.train(&x, &y, 200, 3).unwrap();
    let row = &x[..params.num_literals()];
    c.bench_function("predict one row on a trained Dense engine", |b| {
        let mut y_pred = vec![0u8; 4];
        b.iter(|| engine.predict(row, &mut y_pred, 1).unwrap())
    });
}

fn training_sparse_epoch(c: &mut criterion::Criterion) {
    let params = bench_params();
    let (x, y) = random_rows(3, 500, params.num_literals());
    c.bench_function("train Sparse engine for one epoch (500 rows)", |b| {
        b.iter(|| {
            let mut engine = SparseEngine::create(params, 3).unwrap();
            engine.train(&x, &y, 500, 1).unwrap();
        })
    });
}

fn predicting_sparse_row(c: &mut criterion::Criterion) {
    let params = bench_params();
    let (x, y) = random_rows(4, 200, params.num_literals());
    let mut engine = SparseEngine::create(params, 4).unwrap();
    engine.train(&x, &y, 200, 3).unwrap();
    let row = &x[..params.num_literals()];
    c.bench_function("predict one row on a trained Sparse engine", |b| {
        let mut y_pred = vec![0u8; 4];
        b.iter(|| engine.predict(row, &mut y_pred, 1).unwrap())
    });
}

fn predicting_stateless_row(c: &mut criterion::Criterion) {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("tsetlin-engine-bench-{}", std::process::id()));

    let params = bench_params();
    let (x, y) = random_rows(5, 200, params.num_literals());
    let mut dense = DenseEngine::create(params, 5).unwrap();
    dense.train(&x, &y, 200, 3).unwrap();
    dense.save(&path).unwrap();

    let mut engine = StatelessEngine::load_dense(&path, 1, 4).unwrap();
    let row = &x[..params.num_literals()];
    c.bench_function("predict one row on a Stateless engine", |b| {
        let mut y_pred = vec![0u8; 4];
        b.iter(|| engine.predict(row, &mut y_pred, 1).unwrap())
    });

    let _ = std::fs::remove_file(&path);
}

fn cross_loading_dense_into_sparse(c: &mut criterion::Criterion) {
    let dir = std::env::temp_dir();
    let path = dir.join(format!("tsetlin-engine-bench-xload-{}", std::process::id()));

    let params = bench_params();
    let (x, y) = random_rows(6, 200, params.num_literals());
    let mut dense = DenseEngine::create(params, 6).unwrap();
    dense.train(&x, &y, 200, 3).unwrap();
    dense.save(&path).unwrap();

    c.bench_function("cross-load a dense file into a Sparse engine", |b| {
        b.iter(|| SparseEngine::load_dense(&path, 1, 4).unwrap())
    });

    let _ = std::fs::remove_file(&path);
}
