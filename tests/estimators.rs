use mvcca::{
    AltMaxVar, AltMaxVarConfig, CcaError, ElasticCca, ElasticConfig, Initialization,
    IterativeEstimator, IterativeOptions, Parkhomenko, ParkhomenkoConfig, PerView, PlsAls, Pmd,
    PmdConfig, Span, SpanConfig,
};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn correlated_views(n: usize, features: &[usize], seed: u64) -> Vec<Array2<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let latent: Vec<f64> = (0..n).map(|_| rng.sample(StandardNormal)).collect();
    features
        .iter()
        .map(|&p| {
            Array2::from_shape_fn((n, p), |(i, j)| {
                let noise: f64 = rng.sample(StandardNormal);
                if j % 2 == 0 {
                    latent[i] + 0.5 * noise
                } else {
                    noise
                }
            })
        })
        .collect()
}

fn options(latent_dimensions: usize) -> IterativeOptions {
    IterativeOptions {
        latent_dimensions,
        seed: Some(42),
        ..Default::default()
    }
}

fn every_estimator(latent_dimensions: usize) -> Vec<(&'static str, Box<dyn IterativeEstimator>)> {
    vec![
        (
            "pmd",
            Box::new(Pmd::new(
                options(latent_dimensions),
                PmdConfig {
                    tau: PerView::Shared(0.7),
                    ..Default::default()
                },
            )),
        ),
        ("pls_als", Box::new(PlsAls::new(options(latent_dimensions)))),
        (
            "parkhomenko",
            Box::new(Parkhomenko::new(
                options(latent_dimensions),
                ParkhomenkoConfig {
                    tau: PerView::Shared(0.05),
                },
            )),
        ),
        (
            "elastic",
            Box::new(ElasticCca::new(
                IterativeOptions {
                    latent_dimensions,
                    seed: Some(42),
                    ..ElasticCca::default_options()
                },
                ElasticConfig {
                    alpha: PerView::Shared(0.01),
                    l1_ratio: PerView::Shared(0.5),
                    ..Default::default()
                },
            )),
        ),
        (
            "altmaxvar",
            Box::new(AltMaxVar::new(
                options(latent_dimensions),
                AltMaxVarConfig {
                    tau: PerView::Shared(0.01),
                    ..Default::default()
                },
            )),
        ),
        (
            "span",
            Box::new(Span::new(
                IterativeOptions {
                    max_iter: 20,
                    ..options(latent_dimensions)
                },
                SpanConfig {
                    rank: 2,
                    ..Default::default()
                },
            )),
        ),
    ]
}

#[test]
fn weights_and_scores_have_consistent_shapes() {
    init_logging();
    let views = correlated_views(60, &[8, 6], 1);
    for (name, mut model) in every_estimator(2) {
        let fitted = model.fit(&views).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(fitted.weights.len(), 2, "{name}");
        assert_eq!(fitted.weights[0].dim(), (8, 2), "{name}");
        assert_eq!(fitted.weights[1].dim(), (6, 2), "{name}");
        assert!(fitted.weights.iter().all(|w| w.iter().all(|v| v.is_finite())), "{name}");

        let scores = model.transform(&views).unwrap();
        assert_eq!(scores[0].dim(), (60, 2), "{name}");
        assert_eq!(scores[1].dim(), (60, 2), "{name}");

        let pairs = model.pairwise_correlations(&views).unwrap();
        assert_eq!(pairs.dim(), (2, 2, 2), "{name}");
        assert_eq!(model.score(&views).unwrap().len(), 2, "{name}");
    }
}

#[test]
fn transform_is_repeatable() {
    init_logging();
    let views = correlated_views(50, &[5, 4], 2);
    for (name, mut model) in every_estimator(1) {
        model.fit(&views).unwrap_or_else(|e| panic!("{name}: {e}"));
        let first = model.transform(&views).unwrap();
        let second = model.transform(&views).unwrap();
        assert_eq!(first, second, "{name}");
    }
}

#[test]
fn fit_transform_matches_transform_after_fit() {
    let views = correlated_views(50, &[5, 4], 3);
    let mut model = Pmd::new(options(1), PmdConfig::default());
    let direct = model.fit_transform(&views).unwrap();
    assert_eq!(direct, model.transform(&views).unwrap());
}

#[test]
fn unfitted_estimators_refuse_to_transform() {
    let views = correlated_views(20, &[3, 3], 4);
    for (name, model) in every_estimator(1) {
        assert!(matches!(model.transform(&views), Err(CcaError::NotFitted)), "{name}");
        assert!(matches!(model.score(&views), Err(CcaError::NotFitted)), "{name}");
        assert!(matches!(model.weights(), Err(CcaError::NotFitted)), "{name}");
    }
}

#[test]
fn transform_checks_feature_counts() {
    let views = correlated_views(40, &[5, 4], 5);
    let mut model = PlsAls::new(options(1));
    model.fit(&views).unwrap();
    let wrong = correlated_views(40, &[5, 3], 6);
    assert!(matches!(
        model.transform(&wrong),
        Err(CcaError::FeatureCountMismatch { view: 1, expected: 4, found: 3 })
    ));
}

#[test]
fn unknown_initialization_is_rejected_by_name() {
    let err = "svd".parse::<Initialization>().unwrap_err();
    match err {
        CcaError::InvalidParameter { name, reason } => {
            assert_eq!(name, "initialization");
            assert!(reason.contains("svd"));
        }
        other => panic!("unexpected error {other}"),
    }
}

#[test]
fn uniform_start_on_centred_data_is_degenerate() {
    let views = correlated_views(40, &[5, 4], 7);
    let mut model = Pmd::new(
        IterativeOptions {
            initialization: Initialization::Uniform,
            ..options(1)
        },
        PmdConfig::default(),
    );
    assert!(matches!(
        model.fit(&views),
        Err(CcaError::DegenerateWeights { view: 0, .. })
    ));
    assert!(model.fitted().is_none());
}

#[test]
fn mismatched_rows_are_rejected() {
    let mut views = correlated_views(30, &[4, 4], 8);
    views[1] = correlated_views(29, &[4], 9).remove(0);
    let mut model = Pmd::default();
    assert!(matches!(
        model.fit(&views),
        Err(CcaError::SampleCountMismatch { view: 1, expected: 30, found: 29 })
    ));
}

#[test]
fn per_view_parameters_must_match_view_count() {
    let views = correlated_views(30, &[4, 4, 3], 10);
    let mut model = Pmd::new(
        options(1),
        PmdConfig {
            tau: PerView::Each(vec![0.5, 0.5]),
            ..Default::default()
        },
    );
    assert!(matches!(
        model.fit(&views),
        Err(CcaError::ParameterLength { expected: 3, found: 2, .. })
    ));
}

#[test]
fn three_views_fit_with_every_multiview_variant() {
    let views = correlated_views(60, &[6, 5, 4], 11);
    for (name, mut model) in every_estimator(1) {
        if name == "span" {
            continue;
        }
        let fitted = model.fit(&views).unwrap_or_else(|e| panic!("{name}: {e}"));
        assert_eq!(fitted.weights.len(), 3, "{name}");
        assert_eq!(fitted.weights[2].dim(), (4, 1), "{name}");
        assert_eq!(model.pairwise_correlations(&views).unwrap().dim(), (3, 3, 1));
    }
}

#[test]
fn refitting_replaces_the_previous_model() {
    let first = correlated_views(40, &[5, 4], 12);
    let second = correlated_views(40, &[3, 2], 13);
    let mut model = PlsAls::new(options(1));
    model.fit(&first).unwrap();
    model.fit(&second).unwrap();
    let weights = model.weights().unwrap();
    assert_eq!(weights[0].dim(), (3, 1));
    assert_eq!(weights[1].dim(), (2, 1));
}

#[test]
fn joint_fit_rejects_more_latent_dimensions_than_features() {
    let views = correlated_views(30, &[1, 1], 14);
    let mut model = AltMaxVar::new(options(3), AltMaxVarConfig::default());
    match model.fit(&views) {
        Err(CcaError::InvalidParameter { name, .. }) => assert_eq!(name, "latent_dimensions"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(fitted) => panic!("fit succeeded with weights {:?}", fitted.weights[0].dim()),
    }
    assert!(model.fitted().is_none());
}
