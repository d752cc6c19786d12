//! End-to-end pipeline runs against synthetic datasets, through the public
//! API only.

use std::fmt::Write as _;
use std::path::Path;

use tempfile::tempdir;

use phytostat::config::AnalysisConfig;
use phytostat::experiments;
use phytostat::pipeline::{AnalysisPipeline, ValidationStrategy};
use phytostat::report::ReportFormat;
use phytostat::stratify::StratificationPlan;

fn config_for(dir: &Path) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.data_dir = dir.to_path_buf();
    config.figure_dir = dir.join("figures");
    config
}

/// Perithecia scores with additive substrate and population effects: wheat
/// beats rice and Fg beats Fa, with no interaction. Control rows must be
/// filtered out before anything else happens.
fn write_perithecia_csv(dir: &Path) {
    let mut csv =
        String::from("species,genotype,isolate,substrate,score0,score1,score2,score3\n");
    // (species, substrate) -> score-class counts out of 20 units
    let counts = |species: &str, substrate: &str| -> [u32; 4] {
        match (species, substrate) {
            ("Fg", "wheat") => [0, 2, 6, 12],
            ("Fg", "rice") => [2, 6, 8, 4],
            ("Fa", "wheat") => [4, 6, 8, 2],
            ("Fa", "rice") => [10, 6, 3, 1],
            _ => unreachable!(),
        }
    };
    for species in ["Fg", "Fa"] {
        for iso in 0..3 {
            for substrate in ["wheat", "rice"] {
                for rep in 0..2 {
                    let mut c = counts(species, substrate);
                    // small deterministic wobble so replicates differ
                    let shift = ((iso + rep) % 2) as u32;
                    c[1] += shift;
                    c[2] = c[2].saturating_sub(shift);
                    writeln!(
                        csv,
                        "{species},wt,{species}-{iso},{substrate},{},{},{},{}",
                        c[0], c[1], c[2], c[3]
                    )
                    .unwrap();
                }
            }
        }
    }
    // rows the filter must drop
    csv.push_str("Fg,wt,control,wheat,20,0,0,0\n");
    csv.push_str("Fg,wt,control,rice,20,0,0,0\n");
    std::fs::write(dir.join("perithecia.csv"), csv).unwrap();
}

/// Severity time courses with a strong cultivar-by-population interaction:
/// Fg overwhelms the susceptible cultivar but behaves like Fa on the
/// resistant one.
fn write_severity_csv(dir: &Path) {
    let mut csv =
        String::from("species,genotype,isolate,spike,cultivar,day7,day14,day21\n");
    let curve = |species: &str, cultivar: &str| -> [f64; 3] {
        match (species, cultivar) {
            ("Fg", "susceptible") => [20.0, 55.0, 90.0],
            ("Fg", "resistant") => [5.0, 12.0, 20.0],
            ("Fa", "susceptible") => [8.0, 18.0, 30.0],
            ("Fa", "resistant") => [4.0, 10.0, 18.0],
            _ => unreachable!(),
        }
    };
    let jitter = [0.0, 1.5, -1.5, 0.5];
    for species in ["Fg", "Fa"] {
        for iso in 0..2 {
            for cultivar in ["susceptible", "resistant"] {
                for spike in 0..2 {
                    let base = curve(species, cultivar);
                    let noise = jitter[(iso * 2 + spike) % 4];
                    writeln!(
                        csv,
                        "{species},wt,{species}-{iso},s{spike},{cultivar},{},{},{}",
                        base[0] + noise,
                        base[1] + noise,
                        base[2] + noise
                    )
                    .unwrap();
                }
            }
        }
    }
    csv.push_str("Fg,wt,mock,s0,susceptible,0,0,0\n");
    std::fs::write(dir.join("severity.csv"), csv).unwrap();
}

#[test]
fn perithecia_pipeline_runs_end_to_end() {
    let dir = tempdir().unwrap();
    write_perithecia_csv(dir.path());
    let config = config_for(dir.path());

    let pipeline = AnalysisPipeline::standard(ValidationStrategy::StopOnError);
    let ctx = pipeline
        .run(experiments::by_name("perithecia").unwrap(), config)
        .unwrap();

    // control rows are gone: 2 species x 3 isolates x 2 substrates x 2 reps
    assert_eq!(ctx.metadata["rows_loaded"], serde_json::json!(24));

    let report = ctx.report.expect("report assembled");
    assert!(report.anova.significant("substrate", 0.05));
    assert!(report.anova.significant("population", 0.05));

    let text = report.render(ReportFormat::Text).unwrap();
    assert!(text.contains("perithecia"));
    assert!(text.contains("population"));

    // the JSON rendering parses back
    let json = report.render(ReportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["experiment"], "perithecia");
}

#[test]
fn severity_pipeline_collapses_and_stratifies() {
    let dir = tempdir().unwrap();
    write_severity_csv(dir.path());
    let config = config_for(dir.path());

    let pipeline = AnalysisPipeline::standard(ValidationStrategy::StopOnError);
    let ctx = pipeline
        .run(experiments::by_name("severity").unwrap(), config)
        .unwrap();

    // 2 species x 2 isolates x 2 cultivars x 2 spikes AUDPC rows
    let table = ctx.table.as_ref().unwrap();
    assert_eq!(table.n_rows(), 16);
    assert!(table.has_column("audpc"));

    assert_eq!(
        ctx.plan,
        Some(StratificationPlan::ByFactor("cultivar".to_string()))
    );
    assert_eq!(ctx.means.len(), 2);

    // populations split apart on the susceptible cultivar
    let susceptible = ctx
        .means
        .iter()
        .find(|(label, _)| label.ends_with("susceptible"))
        .map(|(_, t)| t)
        .unwrap();
    let letters: Vec<&str> = susceptible
        .means
        .iter()
        .map(|m| m.letters.as_str())
        .collect();
    assert!(!letters[0].chars().any(|c| letters[1].contains(c)));
}

#[test]
fn figures_land_in_the_configured_directory() {
    let dir = tempdir().unwrap();
    write_perithecia_csv(dir.path());
    let config = config_for(dir.path());

    let pipeline = AnalysisPipeline::standard(ValidationStrategy::StopOnError);
    let ctx = pipeline
        .run(experiments::by_name("perithecia").unwrap(), config)
        .unwrap();

    let figure = ctx.figure.expect("figure rendered");
    assert!(figure.exists());
    assert_eq!(figure.parent().unwrap(), dir.path().join("figures"));
}

#[test]
fn config_file_drives_the_pipeline() {
    let dir = tempdir().unwrap();
    write_perithecia_csv(dir.path());

    let mut config = config_for(dir.path());
    config.alpha = 0.01;
    let path = dir.path().join("phytostat.toml");
    config.save(&path).unwrap();

    let loaded = AnalysisConfig::load(&path).unwrap();
    assert_eq!(loaded.alpha, 0.01);
    assert_eq!(loaded.data_dir, dir.path());

    let pipeline = AnalysisPipeline::standard(ValidationStrategy::StopOnError);
    let ctx = pipeline
        .run(experiments::by_name("perithecia").unwrap(), loaded)
        .unwrap();
    assert!(ctx.report.is_some());
}

#[test]
fn unknown_experiment_is_rejected() {
    assert!(experiments::by_name("does-not-exist").is_err());
}
