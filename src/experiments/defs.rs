//! Concrete recipes for the five experiments.
//!
//! Shared structure: species and genotype are concatenated into one
//! `population` key, isolates carry the random intercept, and estimated
//! means are reported for populations. Where a treatment factor interacts
//! with population, the recipe names it as the conditioning factor so the
//! pipeline can stratify on a significant interaction.

use super::{CompositeSpec, DerivedStep, ExperimentDef, ReshapeSpec};
use crate::data::{ColumnSchema, Predicate};
use crate::model::{ModelSpec, RandomSpec};
use crate::viz::PlotKind;

fn population() -> CompositeSpec {
    CompositeSpec {
        left: "species".to_string(),
        right: "genotype".to_string(),
        out: "population".to_string(),
    }
}

/// Perithecia production on wheat and rice substrate, scored in four ordinal
/// classes per replicate and condensed into a production index.
pub fn perithecia() -> ExperimentDef {
    ExperimentDef {
        name: "perithecia".to_string(),
        description: "Perithecia production index by substrate".to_string(),
        data_file: "perithecia.csv".to_string(),
        schema: vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::categorical("genotype"),
            ColumnSchema::categorical("isolate"),
            ColumnSchema::categorical("substrate"),
            ColumnSchema::numeric("score0"),
            ColumnSchema::numeric("score1"),
            ColumnSchema::numeric("score2"),
            ColumnSchema::numeric("score3"),
        ],
        filters: vec![Predicate::Ne("isolate".to_string(), "control".to_string())],
        drop: vec![],
        reshape: None,
        composite: Some(population()),
        derived: vec![DerivedStep::WeightedIndex {
            class_cols: vec![
                "score0".to_string(),
                "score1".to_string(),
                "score2".to_string(),
                "score3".to_string(),
            ],
            weights: vec![0.0, 1.0, 2.0, 3.0],
            out: "ppi".to_string(),
        }],
        model: ModelSpec::new(
            "ppi",
            &["substrate", "population"],
            RandomSpec::Intercept("isolate".to_string()),
        )
        .with_interaction(),
        summary_responses: vec![],
        emmeans_factors: vec!["population".to_string()],
        conditioning_factor: Some("substrate".to_string()),
        plot_kind: PlotKind::Bar,
        y_label: "Perithecia production index".to_string(),
    }
}

/// Mycelial growth rate across incubation temperatures.
pub fn growth() -> ExperimentDef {
    ExperimentDef {
        name: "growth".to_string(),
        description: "Mycelial growth rate by temperature".to_string(),
        data_file: "growth.csv".to_string(),
        schema: vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::categorical("genotype"),
            ColumnSchema::categorical("isolate"),
            ColumnSchema::categorical("temperature"),
            ColumnSchema::numeric("mgr"),
        ],
        filters: vec![],
        drop: vec![],
        reshape: None,
        composite: Some(population()),
        derived: vec![],
        model: ModelSpec::new(
            "mgr",
            &["temperature", "population"],
            RandomSpec::Intercept("isolate".to_string()),
        )
        .with_interaction(),
        summary_responses: vec![],
        emmeans_factors: vec!["population".to_string()],
        conditioning_factor: Some("temperature".to_string()),
        plot_kind: PlotKind::Point,
        y_label: "Mycelial growth rate (mm/day)".to_string(),
    }
}

/// Macroconidia production in liquid culture. Counts are modeled on the
/// log(x + 1) scale; the germination column rides along for the summary.
pub fn sporulation() -> ExperimentDef {
    ExperimentDef {
        name: "sporulation".to_string(),
        description: "Sporulation in liquid culture".to_string(),
        data_file: "sporulation.csv".to_string(),
        schema: vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::categorical("genotype"),
            ColumnSchema::categorical("isolate"),
            ColumnSchema::numeric("spores"),
            ColumnSchema::numeric("germination"),
        ],
        filters: vec![],
        drop: vec![],
        reshape: None,
        composite: Some(population()),
        derived: vec![DerivedStep::Log1p {
            col: "spores".to_string(),
            out: "log_spores".to_string(),
        }],
        model: ModelSpec::new(
            "log_spores",
            &["population"],
            RandomSpec::Intercept("isolate".to_string()),
        ),
        summary_responses: vec!["germination".to_string()],
        emmeans_factors: vec!["population".to_string()],
        conditioning_factor: None,
        plot_kind: PlotKind::Bar,
        y_label: "log(spores + 1)".to_string(),
    }
}

/// Head blight severity on two cultivars, scored on three dates per spike and
/// integrated into an AUDPC per spike.
pub fn severity() -> ExperimentDef {
    ExperimentDef {
        name: "severity".to_string(),
        description: "Disease severity (AUDPC) by cultivar".to_string(),
        data_file: "severity.csv".to_string(),
        schema: vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::categorical("genotype"),
            ColumnSchema::categorical("isolate"),
            ColumnSchema::categorical("spike"),
            ColumnSchema::categorical("cultivar"),
            ColumnSchema::numeric("day7"),
            ColumnSchema::numeric("day14"),
            ColumnSchema::numeric("day21"),
        ],
        filters: vec![Predicate::Ne("isolate".to_string(), "mock".to_string())],
        drop: vec![],
        reshape: Some(ReshapeSpec {
            value_cols: vec!["day7".to_string(), "day14".to_string(), "day21".to_string()],
            name_col: "day".to_string(),
            value_col: "severity".to_string(),
        }),
        composite: Some(population()),
        derived: vec![DerivedStep::Audpc {
            time_col: "day".to_string(),
            time_prefix: "day".to_string(),
            value_col: "severity".to_string(),
            group_cols: vec![
                "population".to_string(),
                "isolate".to_string(),
                "spike".to_string(),
                "cultivar".to_string(),
            ],
            out: "audpc".to_string(),
        }],
        model: ModelSpec::new(
            "audpc",
            &["cultivar", "population"],
            RandomSpec::Nested {
                outer: "isolate".to_string(),
                inner: "spike".to_string(),
            },
        )
        .with_interaction(),
        summary_responses: vec![],
        emmeans_factors: vec!["population".to_string()],
        conditioning_factor: Some("cultivar".to_string()),
        plot_kind: PlotKind::Bar,
        y_label: "AUDPC".to_string(),
    }
}

/// Fungicide sensitivity as the effective concentration for 50% growth
/// inhibition.
pub fn fungicide() -> ExperimentDef {
    ExperimentDef {
        name: "fungicide".to_string(),
        description: "Fungicide sensitivity (EC50)".to_string(),
        data_file: "fungicide.csv".to_string(),
        schema: vec![
            ColumnSchema::categorical("species"),
            ColumnSchema::categorical("genotype"),
            ColumnSchema::categorical("isolate"),
            ColumnSchema::categorical("fungicide"),
            ColumnSchema::numeric("ec50"),
        ],
        filters: vec![],
        drop: vec![],
        reshape: None,
        composite: Some(population()),
        derived: vec![],
        model: ModelSpec::new(
            "ec50",
            &["fungicide", "population"],
            RandomSpec::Intercept("isolate".to_string()),
        )
        .with_interaction(),
        summary_responses: vec![],
        emmeans_factors: vec!["population".to_string()],
        conditioning_factor: Some("fungicide".to_string()),
        plot_kind: PlotKind::Point,
        y_label: "EC50 (\u{b5}g/mL)".to_string(),
    }
}
