use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use edca_lab_abstract::{ConfigurationSpec, ExperimentSpec, Metric, MetricKind, SweepBounds};
use edca_lab_harness::{
    AssumeYes, CancelToken, ChartFormat, Confirm, ErrorKind, HarnessError, Invocation, Pipeline,
    ProcessEngine, Result, SimulationEngine, Stage, rerender,
};

type LineFn = Box<dyn FnMut(&Invocation) -> Option<String>>;

/// Stands in for the simulator: appends whatever `line` returns to the shared file.
struct FakeEngine {
    dir: PathBuf,
    calls: Vec<(String, usize)>,
    line: LineFn,
}

impl FakeEngine {
    fn new(dir: &Path, line: impl FnMut(&Invocation) -> Option<String> + 'static) -> Self {
        Self {
            dir: dir.to_path_buf(),
            calls: Vec::new(),
            line: Box::new(line),
        }
    }

    /// One record per point whose total throughput is `index + 1`.
    fn counting(dir: &Path) -> Self {
        Self::new(dir, |inv| Some(record(inv.point.index as f64 + 1.0)))
    }
}

impl SimulationEngine for FakeEngine {
    fn artifact_path(&self) -> PathBuf {
        self.dir.join("wifi-edca.dat")
    }

    fn invoke(&mut self, invocation: &Invocation) -> Result<()> {
        self.calls
            .push((invocation.configuration.clone(), invocation.point.index));
        if let Some(text) = (self.line)(invocation) {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.artifact_path())
                .unwrap();
            file.write_all(text.as_bytes()).unwrap();
        }
        Ok(())
    }
}

/// A 32-field engine line. Class throughputs are `total / 4`, the BK
/// end-to-end delay is `nan` as the engine prints for idle classes.
fn record(total_throughput: f64) -> String {
    let mut fields: Vec<String> = (0..32).map(|i| format!("{}", i as f64 * 0.01)).collect();
    for class in 0..4 {
        fields[5 + class] = (total_throughput / 4.0).to_string();
    }
    fields[9] = total_throughput.to_string();
    fields[21] = "nan".to_string();
    fields.join(",") + "\n"
}

struct Scripted {
    answer: bool,
    asked: usize,
}

impl Confirm for Scripted {
    fn confirm(&mut self, _question: &str) -> Result<bool> {
        self.asked += 1;
        Ok(self.answer)
    }
}

fn experiment(populations: &[(u32, u32, u32, u32)]) -> ExperimentSpec {
    let mut spec = ExperimentSpec::default();
    spec.configurations = populations
        .iter()
        .map(|&(be, bk, vi, vo)| ConfigurationSpec {
            label: None,
            be,
            bk,
            vi,
            vo,
            mode: None,
        })
        .collect();
    spec
}

struct Workspace {
    _tmp: tempfile::TempDir,
    engine_dir: PathBuf,
    results_root: PathBuf,
}

fn workspace() -> Workspace {
    let tmp = tempfile::tempdir().unwrap();
    let engine_dir = tmp.path().join("ns-3");
    let results_root = tmp.path().join("results");
    fs::create_dir(&engine_dir).unwrap();
    Workspace {
        engine_dir,
        results_root,
        _tmp: tmp,
    }
}

fn pipeline(ws: &Workspace, spec: ExperimentSpec) -> Pipeline {
    Pipeline::new(spec)
        .results_root(&ws.results_root)
        .provenance_dir(&ws.engine_dir)
        .emitters(ChartFormat::Both.emitters())
}

/// Chart files (anything but the manifest and raw artifacts) under `root`.
fn chart_files(root: &Path) -> Vec<PathBuf> {
    let Ok(runs) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut charts = Vec::new();
    for run in runs {
        for entry in fs::read_dir(run.unwrap().path()).unwrap() {
            let path = entry.unwrap().path();
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if (name.ends_with(".txt") || name.ends_with(".json"))
                && name != "bundle.json"
                && name != "git-commit.txt"
            {
                charts.push(path);
            }
        }
    }
    charts
}

#[test]
fn reference_sweep_yields_aligned_total_throughput() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let mut pipeline = pipeline(&ws, ExperimentSpec::default());

    let report = pipeline.run(&mut engine, &mut AssumeYes).unwrap();

    assert_eq!(pipeline.stage(), Stage::Rendered);
    assert_eq!(report.invocations, 7);
    assert_eq!(engine.calls.len(), 7);
    assert!(engine.calls.iter().all(|(label, _)| label == "2_BE_2_BK_2_VI_2_VO"));
    assert!(!engine.artifact_path().exists());

    let thrp = report
        .datasets
        .iter()
        .find(|d| d.name == "wifi-edca-thrp")
        .unwrap();
    let expected_x = [-5.0, -4.5, -4.0, -3.5, -3.0, -2.5, -2.0].map(|e| 10f64.powf(e));
    for (x, want) in thrp.x.iter().zip(expected_x) {
        assert!((x - want).abs() <= 1e-12 * want);
    }
    let total = thrp.series.iter().find(|s| s.label == "Total").unwrap();
    assert_eq!(total.metric, Metric::total(MetricKind::Throughput));
    assert_eq!(total.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);

    let delay = report
        .datasets
        .iter()
        .find(|d| d.name == "wifi-edca-delay")
        .unwrap();
    assert!(delay.series[1].values.iter().all(|v| v.is_nan()));

    // Four default charts, each as text and JSON.
    assert_eq!(report.charts.len(), 8);
    assert!(report.results_dir.join("wifi-edca-thrp.txt").is_file());
    assert!(report.results_dir.join("bundle.json").is_file());
    assert!(report.results_dir.join("git-commit.txt").is_file());
    let artifact = report.results_dir.join("wifi-edca-2_BE_2_BK_2_VI_2_VO.dat");
    assert_eq!(fs::read_to_string(artifact).unwrap().lines().count(), 7);
}

#[test]
fn back_to_back_runs_leave_earlier_bundle_intact() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);

    let first = pipeline(&ws, ExperimentSpec::default())
        .run(&mut engine, &mut AssumeYes)
        .unwrap();
    let second = pipeline(&ws, ExperimentSpec::default())
        .run(&mut engine, &mut AssumeYes)
        .unwrap();

    assert_ne!(first.results_dir, second.results_dir);
    assert_eq!(engine.calls.len(), 14);
    for report in [&first, &second] {
        let artifact = report.results_dir.join("wifi-edca-2_BE_2_BK_2_VI_2_VO.dat");
        assert_eq!(fs::read_to_string(artifact).unwrap().lines().count(), 7);
    }
    let again = rerender(&first.results_dir, ChartFormat::Json.emitters()).unwrap();
    // Throughput holds no NaN columns, so the whole dataset compares equal.
    assert_eq!(again.datasets[0].name, "wifi-edca-thrp");
    assert_eq!(again.datasets[0], first.datasets[0]);
}

#[test]
fn unusable_experiment_name_fails_before_any_invocation() {
    let ws = workspace();
    let stale = ws.engine_dir.join("wifi-edca.dat");
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let mut spec = ExperimentSpec::default();
    spec.name = "acs/run".to_string();

    let err = pipeline(&ws, spec).run(&mut engine, &mut AssumeYes).unwrap_err();

    assert!(matches!(err, HarnessError::InvalidExperiment(_)));
    assert_eq!(err.exit_code(), 2);
    assert!(engine.calls.is_empty());
    assert!(!stale.exists());
    assert!(!ws.results_root.exists());
}

#[test]
fn configurations_run_sequentially_in_sweep_order() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let spec = experiment(&[(8, 0, 0, 0), (0, 0, 0, 8)]);

    let report = pipeline(&ws, spec).run(&mut engine, &mut AssumeYes).unwrap();

    let order: Vec<(&str, usize)> = engine
        .calls
        .iter()
        .map(|(label, index)| (label.as_str(), *index))
        .collect();
    let mut expected = Vec::new();
    for label in ["8_BE_0_BK_0_VI_0_VO", "0_BE_0_BK_0_VI_8_VO"] {
        for index in 0..7 {
            expected.push((label, index));
        }
    }
    assert_eq!(order, expected);

    // Several configurations default to comparisons of the aggregate columns.
    let names: Vec<&str> = report.datasets.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(
        names,
        [
            "wifi-edca-thrp-total-comparison",
            "wifi-edca-delay-total-comparison",
            "wifi-edca-acc-delay-total-comparison",
            "wifi-edca-queue-delay-total-comparison",
        ]
    );
    let legends: Vec<&str> = report.datasets[0]
        .series
        .iter()
        .map(|s| s.label.as_str())
        .collect();
    assert_eq!(legends, ["8_BE_0_BK_0_VI_0_VO", "0_BE_0_BK_0_VI_8_VO"]);
    assert_eq!(report.bundle.artifacts.len(), 2);
}

#[test]
fn truncated_artifact_fails_rerender_without_charts() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let spec = experiment(&[(2, 2, 2, 2), (4, 0, 4, 0)]);
    let report = pipeline(&ws, spec).run(&mut engine, &mut AssumeYes).unwrap();

    for chart in &report.charts {
        fs::remove_file(chart).unwrap();
    }
    let second = &report.bundle.artifacts[1];
    let content = fs::read_to_string(&second.path).unwrap();
    let kept: Vec<&str> = content.lines().take(6).collect();
    fs::write(&second.path, kept.join("\n") + "\n").unwrap();

    let err = rerender(&report.results_dir, ChartFormat::Both.emitters()).unwrap_err();
    match &err {
        HarnessError::LengthMismatch {
            configuration,
            expected,
            actual,
            ..
        } => {
            assert_eq!(configuration, "4_BE_0_BK_4_VI_0_VO");
            assert_eq!(*expected, 7);
            assert_eq!(*actual, 6);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.kind(), ErrorKind::Decode);
    assert!(chart_files(&ws.results_root).is_empty());
}

#[test]
fn extra_engine_output_aborts_before_any_chart() {
    let ws = workspace();
    let mut engine = FakeEngine::new(&ws.engine_dir, |inv| {
        let line = record(1.0);
        if inv.configuration == "0_BE_4_BK_0_VI_0_VO" && inv.point.index == 3 {
            Some(format!("{line}{line}"))
        } else {
            Some(line)
        }
    });
    let spec = experiment(&[(4, 0, 0, 0), (0, 4, 0, 0)]);
    let mut pipeline = pipeline(&ws, spec);

    let err = pipeline.run(&mut engine, &mut AssumeYes).unwrap_err();

    assert!(matches!(
        &err,
        HarnessError::LengthMismatch { configuration, actual: 8, .. } if configuration == "0_BE_4_BK_0_VI_0_VO"
    ));
    assert_eq!(pipeline.stage(), Stage::Collecting);
    assert!(chart_files(&ws.results_root).is_empty());
}

#[test]
fn declining_stale_artifact_removal_runs_nothing() {
    let ws = workspace();
    let stale = ws.engine_dir.join("wifi-edca.dat");
    fs::write(&stale, record(9.0)).unwrap();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let mut prompt = Scripted {
        answer: false,
        asked: 0,
    };

    let err = pipeline(&ws, ExperimentSpec::default())
        .run(&mut engine, &mut prompt)
        .unwrap_err();

    assert!(matches!(&err, HarnessError::Declined(p) if p == &stale));
    assert_ne!(err.exit_code(), 0);
    assert_eq!(prompt.asked, 1);
    assert!(engine.calls.is_empty());
    assert!(stale.exists());
    assert!(!ws.results_root.exists());
}

#[test]
fn accepted_stale_artifact_is_not_collected() {
    let ws = workspace();
    fs::write(ws.engine_dir.join("wifi-edca.dat"), record(99.0)).unwrap();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let mut prompt = Scripted {
        answer: true,
        asked: 0,
    };

    let report = pipeline(&ws, ExperimentSpec::default())
        .run(&mut engine, &mut prompt)
        .unwrap();

    assert_eq!(prompt.asked, 1);
    let thrp = &report.datasets[0];
    let total = thrp.series.iter().find(|s| s.label == "Total").unwrap();
    assert_eq!(total.values[0], 1.0);
}

#[test]
fn interrupt_abandons_remaining_sweep() {
    let ws = workspace();
    let token = CancelToken::new();
    let handler = token.clone();
    let mut engine = FakeEngine::new(&ws.engine_dir, move |inv| {
        if inv.point.index == 2 {
            handler.cancel();
        }
        Some(record(1.0))
    });
    let mut pipeline = pipeline(&ws, ExperimentSpec::default()).cancel_token(token);

    let err = pipeline.run(&mut engine, &mut AssumeYes).unwrap_err();

    assert!(matches!(err, HarnessError::Interrupted));
    assert_eq!(err.exit_code(), 130);
    assert_eq!(engine.calls.len(), 3);
    assert_eq!(pipeline.stage(), Stage::Sweeping);
    assert!(chart_files(&ws.results_root).is_empty());
}

#[test]
fn missing_output_names_configuration_and_point() {
    let ws = workspace();
    let mut engine = FakeEngine::new(&ws.engine_dir, |inv| {
        (inv.point.index != 4).then(|| record(1.0))
    });

    let err = pipeline(&ws, experiment(&[(1, 1, 1, 1)]))
        .run(&mut engine, &mut AssumeYes)
        .unwrap_err();

    match &err {
        HarnessError::ArtifactMissing {
            configuration,
            point,
            ..
        } => {
            assert_eq!(configuration, "1_BE_1_BK_1_VI_1_VO");
            assert_eq!(*point, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 3);
    assert_eq!(engine.calls.len(), 5);
}

#[test]
fn invalid_sweep_fails_before_any_invocation() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let mut spec = ExperimentSpec::default();
    spec.sweep = SweepBounds {
        min_exponent: -2.0,
        max_exponent: -5.0,
        step: 0.5,
    };

    let err = pipeline(&ws, spec).run(&mut engine, &mut AssumeYes).unwrap_err();

    assert!(matches!(err, HarnessError::InvalidSweep(_)));
    assert_eq!(err.kind(), ErrorKind::Precondition);
    assert!(engine.calls.is_empty());
}

#[test]
fn bundle_rerenders_without_engine() {
    let ws = workspace();
    let mut engine = FakeEngine::counting(&ws.engine_dir);
    let report = pipeline(&ws, ExperimentSpec::default())
        .run(&mut engine, &mut AssumeYes)
        .unwrap();
    for chart in &report.charts {
        fs::remove_file(chart).unwrap();
    }

    let again = rerender(&report.results_dir, ChartFormat::Json.emitters()).unwrap();

    assert_eq!(again.invocations, 0);
    assert_eq!(again.charts.len(), 4);
    assert!(again.charts.iter().all(|p| p.extension().unwrap() == "json"));
    let names = |datasets: &[edca_lab_harness::ChartDataset]| {
        datasets.iter().map(|d| d.name.clone()).collect::<Vec<_>>()
    };
    assert_eq!(names(&again.datasets), names(&report.datasets));
    assert_eq!(
        again.datasets[0].series.last().unwrap().values,
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]
    );
}

#[cfg(unix)]
#[test]
fn process_engine_drives_a_shell_script() {
    let ws = workspace();
    let script = "n=$(cat count 2>/dev/null || echo 0); n=$((n+1)); echo $n > count; \
                  echo \"0,0,0,0,0,0,0,0,0,$n,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0\" >> wifi-edca.dat";
    let mut engine = ProcessEngine::builder()
        .program("/bin/sh")
        .launcher_args(["-c", script])
        .working_dir(&ws.engine_dir)
        .build()
        .unwrap();
    let mut spec = ExperimentSpec::default();
    spec.sweep = SweepBounds {
        min_exponent: -3.0,
        max_exponent: -2.0,
        step: 1.0,
    };
    spec.charts = vec![edca_lab_abstract::ChartRequest::Comparison {
        metric: Metric::total(MetricKind::Throughput),
        file_name: None,
    }];

    let report = pipeline(&ws, spec).run(&mut engine, &mut AssumeYes).unwrap();

    assert_eq!(report.datasets[0].series[0].values, vec![1.0, 2.0]);
    assert_eq!(report.invocations, 2);
}
