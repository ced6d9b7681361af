use hyreach::prelude::*;
use nalgebra::{DMatrix, DVector, dvector};

fn still() -> LinearSimulator {
    LinearSimulator::new(DMatrix::zeros(2, 2), DVector::zeros(2)).unwrap()
}

fn damped() -> LinearSimulator {
    LinearSimulator::new(DMatrix::from_row_slice(2, 2, &[-0.5, 1.0, -1.0, -0.5]), DVector::zeros(2)).unwrap()
}

fn initial() -> StarSet {
    StarSet::rect_to_star(&dvector![0.5, -0.25], &dvector![1.5, 0.25]).unwrap()
}

fn config(kind: StrategyKind) -> ReachConfig {
    let mut conf = ReachConfig::default();
    conf.strategy.kind = kind;
    conf.sampling.samples = 25;
    conf.sampling.seed = Some(2024);
    conf.sampling.miss_tolerance = 1.0;
    conf.estimator.hidden = 8;
    conf.estimator.epochs = 3;
    conf.estimator.batch_size = 10;
    conf.estimator.pool_factor = 2;
    conf.estimator.eval_samples = 20;
    conf
}

fn strictly_increasing(tube: &ReachTube) -> bool {
    let times: Vec<f64> = tube.times().collect();
    times.windows(2).all(|w| w[0] < w[1])
}

#[test]
fn linear_strategy_on_still_dynamics_reproduces_the_star() {
    let sim = still();
    let mut builder = ReachTubeBuilder::new(config(StrategyKind::Linear), &sim).unwrap();
    let tube = builder.build(&ModeLabel::from("Still"), &initial(), 2.0, 0.5).unwrap();
    assert_eq!(tube.len(), 5);
    assert_eq!(tube.mode(), &ModeLabel::from("Still"));
    for star in tube.stars() {
        assert!((star.center() - initial().center()).amax() < 1e-12);
        assert!((star.basis() - initial().basis()).amax() < 1e-12);
        assert_eq!(star.predicate(), initial().predicate());
    }
}

#[test]
fn every_strategy_yields_increasing_times() {
    let sim = damped();
    let mode = ModeLabel::new(["Normal", "T1"]);
    let bloater = CornerBloater::new(0.05);

    let mut iterative = config(StrategyKind::SampleFit);
    iterative.strategy.mode = SampleFitMode::Iterative;
    let mut parallel = config(StrategyKind::SampleFit);
    parallel.strategy.parallel = true;
    let mut gradient = config(StrategyKind::SampleFit);
    gradient.strategy.fitter = FitterKind::Gradient;

    let confs = [
        config(StrategyKind::Linear),
        config(StrategyKind::Bloating),
        config(StrategyKind::SampleFit),
        iterative,
        parallel,
        gradient,
        config(StrategyKind::Learned),
    ];
    for conf in confs {
        let label = format!("{} / {}", conf.strategy.kind, conf.strategy.mode);
        let mut builder = ReachTubeBuilder::new(conf, &sim).unwrap().with_bloater(&bloater);
        let tube = builder.build(&mode, &initial(), 1.0, 0.25).unwrap();
        assert!(!tube.is_empty(), "{label}");
        assert!(strictly_increasing(&tube), "{label}");
        assert_eq!(tube.get(0).unwrap().time, 0.0, "{label}");
    }
}

#[test]
fn sample_fit_tube_covers_the_simulated_center() {
    let sim = damped();
    let mode = ModeLabel::from("Normal");
    let mut builder = ReachTubeBuilder::new(config(StrategyKind::SampleFit), &sim).unwrap();
    let tube = builder.build(&mode, &initial(), 1.0, 0.25).unwrap();

    // Linear dynamics map the box center into the hull of the simulated samples.
    let center = sim.simulate(&mode, &dvector![1.0, 0.0], 1.0, 0.25).unwrap();
    let solver = FeasibilitySolver::default();
    for (entry, state) in tube.iter().zip(center.states()) {
        assert!(entry.star.contains_point(&solver, state).unwrap(), "t = {}", entry.time);
    }
}

#[test]
fn learned_tube_keeps_the_predicate_shape() {
    let sim = damped();
    let mode = ModeLabel::from("Normal");
    let mut builder = ReachTubeBuilder::new(config(StrategyKind::Learned), &sim).unwrap();
    let first = builder.build(&mode, &initial(), 0.5, 0.25).unwrap();
    assert_eq!(first.len(), 3);
    let (c, _) = first.get(1).unwrap().star.predicate();
    assert_eq!(c, initial().predicate().0);
}

#[test]
fn tube_rectangles_follow_the_bloated_boxes() {
    let sim = still();
    let bloater = CornerBloater::new(0.0);
    let mut builder = ReachTubeBuilder::new(config(StrategyKind::Bloating), &sim)
        .unwrap()
        .with_bloater(&bloater);
    let tube = builder.build(&ModeLabel::from("Still"), &initial(), 1.0, 0.5).unwrap();
    let rects = tube.overapprox_rectangles(&FeasibilitySolver::default()).unwrap();
    assert_eq!(rects.len(), 2);
    for (_, rect) in rects {
        assert!((rect.mins - dvector![0.5, -0.25]).amax() < 1e-6);
        assert!((rect.maxes - dvector![1.5, 0.25]).amax() < 1e-6);
    }
}

#[test]
fn configuration_round_trips_through_a_file() {
    let mut conf = config(StrategyKind::Bloating);
    conf.solver.timeout_ms = Some(1500);
    conf.bloating.stitch = StitchRule::SharedTimestamp;
    conf.strategy.workers = Some(2);

    let path = std::env::temp_dir().join(format!("hyreach-roundtrip-{}.toml", std::process::id()));
    conf.save_to_toml(&path).unwrap();
    let loaded = ReachConfig::load_from_toml(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, conf);

    let missing = ReachConfig::load_from_toml(&path).unwrap_err();
    assert!(missing.is_io());
}

#[test]
fn tubes_serialize_with_their_stars() {
    let sim = still();
    let mut builder = ReachTubeBuilder::new(config(StrategyKind::Linear), &sim).unwrap();
    let tube = builder.build(&ModeLabel::new(["Normal", "T1"]), &initial(), 0.5, 0.5).unwrap();

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Stored {
        tube: ReachTube,
    }
    let text = toml::to_string(&Stored { tube: tube.clone() }).unwrap();
    let back: Stored = toml::from_str(&text).unwrap();
    assert_eq!(back.tube, tube);
}

#[test]
fn malformed_stored_stars_and_tubes_are_rejected() {
    #[derive(serde::Serialize)]
    struct LooseStar {
        center: DVector<f64>,
        basis: DMatrix<f64>,
        c: DMatrix<f64>,
        g: DVector<f64>,
    }
    #[derive(serde::Serialize)]
    struct StoredLoose {
        star: LooseStar,
    }
    #[derive(Debug, serde::Deserialize)]
    struct StoredStar {
        #[allow(dead_code)]
        star: StarSet,
    }

    // Predicate width 3 against two generators.
    let text = toml::to_string(&StoredLoose {
        star: LooseStar {
            center: DVector::zeros(2),
            basis: DMatrix::identity(2, 2),
            c: DMatrix::identity(3, 3),
            g: DVector::from_element(3, 1.0),
        },
    })
    .unwrap();
    let err = toml::from_str::<StoredStar>(&text).unwrap_err();
    assert!(err.to_string().contains("predicate width"));

    #[derive(serde::Serialize)]
    struct LooseTube {
        mode: ModeLabel,
        entries: Vec<TubeEntry>,
    }
    #[derive(serde::Serialize)]
    struct StoredLooseTube {
        tube: LooseTube,
    }
    #[derive(Debug, serde::Deserialize)]
    struct StoredTube {
        #[allow(dead_code)]
        tube: ReachTube,
    }

    let text = toml::to_string(&StoredLooseTube {
        tube: LooseTube {
            mode: ModeLabel::from("Normal"),
            entries: vec![
                TubeEntry { time: 1.0, star: initial() },
                TubeEntry { time: 0.5, star: initial() },
            ],
        },
    })
    .unwrap();
    assert!(toml::from_str::<StoredTube>(&text).is_err());
}
