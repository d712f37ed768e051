//! End-to-end properties of the control core
//!
//! Drives the calculator, ramp limiter, and learner the way the daemon's
//! control loop does, and checks the invariants that must hold for every
//! reachable state.

use bs2_core::constants::control;
use bs2_core::{
    apply_ramp_limit, blend_offsets, calculate_target_rpm, curve_edge_rpm_bounds, effective_curve,
    evaluate_curve, learn_curve_offsets, normalize_smart_control, AppConfig, LearnSample,
};

/// Minimal stand-in for the daemon tick: FIFO, calculator, ramp, learner.
struct Harness {
    cfg: AppConfig,
    last_avg_temp: i32,
    last_target_rpm: i32,
    recent: Vec<i32>,
    emitted: Vec<i32>,
}

impl Harness {
    fn new() -> Self {
        let (cfg, _) = bs2_core::normalize_app_config(AppConfig::default());
        Self {
            cfg,
            last_avg_temp: 0,
            last_target_rpm: 0,
            recent: Vec::new(),
            emitted: Vec::new(),
        }
    }

    fn seeded(first_temp: i32) -> Self {
        let mut harness = Self::new();
        harness.last_avg_temp = first_temp;
        harness
    }

    fn fifo_cap(&self) -> usize {
        (self.cfg.smart_control.learn_window + self.cfg.smart_control.learn_delay) as usize
            + control::SAMPLE_FIFO_SLACK
    }

    fn tick(&mut self, avg_temp: i32) -> i32 {
        self.recent.push(avg_temp);
        let cap = self.fifo_cap();
        if self.recent.len() > cap {
            self.recent.remove(0);
        }

        let sc = &self.cfg.smart_control;
        let target = calculate_target_rpm(avg_temp, self.last_avg_temp, &self.cfg.fan_curve, sc);
        let emitted = apply_ramp_limit(
            target,
            self.last_target_rpm,
            sc.ramp_up_limit,
            sc.ramp_down_limit,
        );

        let sample = LearnSample {
            avg_temp,
            last_avg_temp: self.last_avg_temp,
            target_rpm: emitted,
            last_target_rpm: self.last_target_rpm,
        };
        let outcome = learn_curve_offsets(sample, &self.recent, &self.cfg.fan_curve, sc);
        if outcome.changed {
            outcome.apply_to(&mut self.cfg.smart_control);
        }

        self.last_avg_temp = avg_temp;
        self.last_target_rpm = emitted;
        self.emitted.push(emitted);
        emitted
    }

    fn run(&mut self, temps: &[i32]) {
        for &temp in temps {
            self.tick(temp);
        }
    }

    fn assert_invariants(&self) {
        let sc = &self.cfg.smart_control;
        let curve = &self.cfg.fan_curve;

        // P1: array lengths track the curve and the bucket count
        assert_eq!(sc.learned_offsets.len(), curve.len());
        assert_eq!(sc.learned_offsets_heat.len(), curve.len());
        assert_eq!(sc.learned_offsets_cool.len(), curve.len());
        assert_eq!(sc.learned_rate_heat.len(), control::RATE_BUCKET_COUNT);
        assert_eq!(sc.learned_rate_cool.len(), control::RATE_BUCKET_COUNT);

        // P2: offsets inside the admissible per-point range
        let (edge_min, edge_max) = curve_edge_rpm_bounds(curve);
        for table in [&sc.learned_offsets_heat, &sc.learned_offsets_cool] {
            for (i, &offset) in table.iter().enumerate() {
                assert!(offset.abs() <= sc.max_learn_offset);
                let shifted = curve[i].rpm + offset;
                assert!(
                    shifted >= edge_min && shifted <= edge_max,
                    "offset {} at index {} escapes the envelope",
                    offset,
                    i
                );
            }
        }

        // P3: rate biases inside the cap
        let cap = (sc.max_learn_offset / 2).clamp(80, 600);
        for table in [&sc.learned_rate_heat, &sc.learned_rate_cool] {
            for &bias in table.iter() {
                assert!(bias >= -cap && bias <= cap);
            }
        }

        // P4: effective curve is non-decreasing for every offset selection
        for table in [&sc.learned_offsets_heat, &sc.learned_offsets_cool, &sc.learned_offsets] {
            let effective = effective_curve(curve, table, &sc.learned_offsets, sc.max_learn_offset);
            for window in effective.windows(2) {
                assert!(window[0].rpm <= window[1].rpm);
            }
        }

        // P5: consecutive emissions bounded by the larger ramp limit
        let max_step = sc.ramp_up_limit.max(sc.ramp_down_limit);
        for window in self.emitted.windows(2) {
            assert!((window[1] - window[0]).abs() <= max_step);
        }

        // P8: blended is the truncating mean of heat and cool
        let blended = blend_offsets(&sc.learned_offsets_heat, &sc.learned_offsets_cool);
        let (blended, _) = bs2_core::constrain_offsets_to_curve(&blended, curve, sc.max_learn_offset);
        assert_eq!(sc.learned_offsets, blended);
    }
}

#[test]
fn steady_state_below_setpoint_converges() {
    let mut harness = Harness::new();
    harness.run(&[50; 9]);
    harness.assert_invariants();

    // Ramp-limited climb, then a fixed point: the last two emissions agree
    let len = harness.emitted.len();
    assert!(harness.emitted[len - 1] > 0);
    assert!((harness.emitted[len - 1] - harness.emitted[len - 2]).abs() <= 4);

    // Far below the setpoint nothing pushes the curve up; any learning at
    // 50°C spends less RPM, never more
    let sc = &harness.cfg.smart_control;
    assert!(sc.learned_offsets_heat.iter().all(|&v| v <= 0));
    assert!(sc.learned_offsets_cool.iter().all(|&v| v <= 0));
}

#[test]
fn hysteresis_deadband_mutes_error_term() {
    let curve = AppConfig::default().fan_curve;
    let (sc, _) = normalize_smart_control(
        bs2_core::SmartControlConfig::defaults_for(&curve),
        &curve,
    );
    // targetTemp 68, hysteresis 2: every |err| <= 2 below leaves only the
    // base curve and the trend terms
    assert_eq!(
        calculate_target_rpm(69, 68, &curve, &sc),
        evaluate_curve(69, &curve) + 1 * (8 + 5 * 2 + 5 * 3)
    );
    assert_eq!(
        calculate_target_rpm(70, 69, &curve, &sc),
        evaluate_curve(70, &curve) + 1 * (8 + 5 * 2 + 5 * 3)
    );
    assert_eq!(
        calculate_target_rpm(69, 70, &curve, &sc),
        evaluate_curve(69, &curve) + (-1) * (1 + 5 / 3)
    );
    assert_eq!(
        calculate_target_rpm(68, 68, &curve, &sc),
        evaluate_curve(68, &curve)
    );
}

#[test]
fn overheat_boost_applies_on_both_ticks() {
    // A shallow curve keeps the total below the device clamp so the boost
    // stays visible
    let mut cfg = AppConfig::default();
    cfg.fan_curve = vec![
        bs2_core::CurvePoint { temperature: 30, rpm: 1000 },
        bs2_core::CurvePoint { temperature: 95, rpm: 2000 },
    ];
    let (cfg, _) = bs2_core::normalize_app_config(cfg);
    let sc = &cfg.smart_control;

    // 83 >= 68 + 15: boost = 320 + 8*15 = 440 on top of base and error
    let first = calculate_target_rpm(83, 83, &cfg.fan_curve, sc);
    let second = calculate_target_rpm(83, 83, &cfg.fan_curve, sc);
    let base = evaluate_curve(83, &cfg.fan_curve);
    let expected = base + 15 * (12 + 5 * 4) + 440;
    assert_eq!(first, expected);
    assert_eq!(second, expected);
}

#[test]
fn ramp_limits_shape_successive_emissions() {
    // Calculator wants 2400, previous emission 1500, rampUpLimit 220
    let mut last = 1500;
    let mut steps = Vec::new();
    for _ in 0..5 {
        last = apply_ramp_limit(2400, last, 220, 160);
        steps.push(last);
    }
    assert_eq!(steps, vec![1720, 1940, 2160, 2380, 2400]);
}

#[test]
fn learning_asymmetry_heat_then_cool() {
    // Rising ramp into a long stable plateau above the setpoint
    let mut rising = Harness::seeded(60);
    rising.run(&[60, 62, 64, 66, 68, 70, 72, 72, 72, 72, 72, 72, 72, 72]);
    rising.assert_invariants();

    let heat = &rising.cfg.smart_control.learned_offsets_heat;
    let cool = &rising.cfg.smart_control.learned_offsets_cool;
    // Curve indices 7..=9 cover 65-75°C
    assert!(
        (7..=9).any(|i| heat[i] > 0),
        "heat table should rise near the plateau: {:?}",
        heat
    );
    assert!(cool.iter().all(|&v| (-4..=4).contains(&v)), "cool drifted: {:?}", cool);

    // Slow descent through the same region: flat-or-falling pairs keep the
    // stability window tight while the falling ticks carry a negative trend
    let mut falling = Harness::seeded(76);
    falling.run(&[76, 75, 74, 74, 73, 73, 72, 72, 71, 71, 70, 70, 69, 69]);
    falling.assert_invariants();

    let cool = &falling.cfg.smart_control.learned_offsets_cool;
    assert!(
        cool.iter().any(|&v| v != 0),
        "cool table should learn on the descent: {:?}",
        cool
    );
}

#[test]
fn reset_learning_zeroes_all_tables() {
    let mut harness = Harness::new();
    harness.run(&[70, 72, 74, 74, 74, 74, 74, 74, 74, 74]);

    harness.cfg.smart_control.reset_learning();
    let (sc, _) = normalize_smart_control(harness.cfg.smart_control.clone(), &harness.cfg.fan_curve);
    harness.cfg.smart_control = sc;

    let sc = &harness.cfg.smart_control;
    assert!(sc.learned_offsets.iter().all(|&v| v == 0));
    assert!(sc.learned_offsets_heat.iter().all(|&v| v == 0));
    assert!(sc.learned_offsets_cool.iter().all(|&v| v == 0));
    assert!(sc.learned_rate_heat.iter().all(|&v| v == 0));
    assert!(sc.learned_rate_cool.iter().all(|&v| v == 0));
    harness.assert_invariants();
}

#[test]
fn invariants_survive_config_and_curve_churn() {
    let mut harness = Harness::new();
    harness.run(&[55, 58, 61, 64, 67, 70, 72, 72]);

    // Shrink the curve mid-flight; normalization reconciles the arrays
    harness.cfg.fan_curve.truncate(8);
    let (cfg, _) = bs2_core::normalize_app_config(harness.cfg.clone());
    harness.cfg = cfg;
    harness.run(&[72, 72, 72, 72, 72]);
    harness.assert_invariants();

    // Grow it back
    harness.cfg.fan_curve = AppConfig::default().fan_curve;
    let (cfg, _) = bs2_core::normalize_app_config(harness.cfg.clone());
    harness.cfg = cfg;
    harness.run(&[70, 68, 66, 66, 66, 66]);
    harness.assert_invariants();
}

#[test]
fn normalizer_idempotence_over_hostile_inputs() {
    let curve = AppConfig::default().fan_curve;
    let hostile = [
        {
            let mut sc = bs2_core::SmartControlConfig::default();
            sc.target_temp = -40;
            sc.max_learn_offset = 100_000;
            sc.learned_offsets_heat = vec![i32::MAX / 2; 3];
            sc
        },
        {
            let mut sc = bs2_core::SmartControlConfig::defaults_for(&curve);
            sc.learned_rate_heat = vec![-9000; 20];
            sc.ramp_up_limit = 50;
            sc.ramp_down_limit = 1200;
            sc
        },
        bs2_core::SmartControlConfig::default(),
    ];

    for sc in hostile {
        let (once, _) = normalize_smart_control(sc, &curve);
        let (twice, changed) = normalize_smart_control(once.clone(), &curve);
        assert!(!changed, "second normalization must be a no-op");
        assert_eq!(once, twice);
    }
}

#[test]
fn empty_curve_yields_no_control() {
    let curve = AppConfig::default().fan_curve;
    let (sc, _) = normalize_smart_control(bs2_core::SmartControlConfig::defaults_for(&curve), &[]);
    assert_eq!(calculate_target_rpm(70, 68, &[], &sc), 0);

    let outcome = learn_curve_offsets(
        LearnSample { avg_temp: 70, last_avg_temp: 68, target_rpm: 0, last_target_rpm: 0 },
        &[70; 10],
        &[],
        &sc,
    );
    assert!(!outcome.changed);
}
