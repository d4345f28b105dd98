//! Job file parsing for the command line driver.

use json::JsonValue;
use log::info;

use geofea::{
    BoundaryRegion, BoundaryRule, FeaError, LinearElastic, Load, LoadMapping, MeshOptions,
    ModelMetadata, Result, Vertex,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshEngine {
    Auto,
    Gmsh,
    Grid,
}

#[derive(Debug, Clone)]
pub struct JobConfig {
    pub metadata: ModelMetadata,
    pub mesh: MeshOptions,
    pub engine: MeshEngine,
    pub load_mapping: LoadMapping,
    pub loads: Vec<Load>,
    /// Empty means the default simple support
    pub boundary_rules: Vec<BoundaryRule>,
}

fn required_f64(section: &JsonValue, section_name: &str, key: &str) -> Result<f64> {
    if !section.has_key(key) {
        return Err(FeaError::Input(format!(
            "Input json missing {key} field in {section_name} section"
        )));
    }
    section[key]
        .as_f64()
        .ok_or_else(|| FeaError::Input(format!("Bad value for {key} in {section_name}")))
}

fn optional_f64(section: &JsonValue, section_name: &str, key: &str) -> Result<Option<f64>> {
    if section[key].is_null() {
        return Ok(None);
    }
    required_f64(section, section_name, key).map(Some)
}

fn parse_point(value: &JsonValue, context: &str) -> Result<Vertex> {
    match (value[0].as_f64(), value[1].as_f64()) {
        (Some(x), Some(y)) if value.len() == 2 => Ok(Vertex { x, y }),
        _ => Err(FeaError::Input(format!(
            "Expected [x, y] point in {context}, got {value}"
        ))),
    }
}

fn parse_metadata(input_json: &JsonValue) -> Result<ModelMetadata> {
    let metadata = &input_json["metadata"];

    let youngs_modulus = required_f64(metadata, "metadata", "youngs_modulus")?;
    let poisson_ratio = required_f64(metadata, "metadata", "poisson_ratio")?;
    let part_thickness = required_f64(metadata, "metadata", "part_thickness")?;
    let plane_stress = metadata["plane_stress"].as_bool().unwrap_or(false);

    if !(part_thickness > 0.0) {
        return Err(FeaError::Input(format!(
            "part_thickness must be positive, got {part_thickness}"
        )));
    }

    Ok(ModelMetadata {
        material: LinearElastic::new(youngs_modulus, poisson_ratio, plane_stress)?,
        part_thickness,
    })
}

fn parse_mesh(input_json: &JsonValue) -> Result<(MeshOptions, MeshEngine)> {
    let section = &input_json["mesh"];
    let defaults = MeshOptions::default();

    let options = MeshOptions {
        max_area: optional_f64(section, "mesh", "max_area")?,
        min_angle: optional_f64(section, "mesh", "min_angle")?.unwrap_or(defaults.min_angle),
        grid_resolution: section["grid_resolution"]
            .as_usize()
            .unwrap_or(defaults.grid_resolution),
    };

    let engine = match section["engine"].as_str().unwrap_or("auto") {
        "auto" => MeshEngine::Auto,
        "gmsh" => MeshEngine::Gmsh,
        "grid" => MeshEngine::Grid,
        other => {
            return Err(FeaError::Input(format!(
                "Unknown mesh engine '{other}'. Expected auto, gmsh or grid"
            )))
        }
    };

    Ok((options, engine))
}

fn parse_load_mapping(input_json: &JsonValue) -> Result<LoadMapping> {
    let section = &input_json["load_mapping"];
    let defaults = LoadMapping::default();

    Ok(LoadMapping {
        edge_tolerance: optional_f64(section, "load_mapping", "edge_tolerance")?
            .unwrap_or(defaults.edge_tolerance),
        traction_unit_divisor: optional_f64(section, "load_mapping", "traction_unit_divisor")?
            .unwrap_or(defaults.traction_unit_divisor),
    })
}

fn parse_loads(input_json: &JsonValue) -> Result<Vec<Load>> {
    let mut loads = Vec::new();

    for (i, load_json) in input_json["loads"].members().enumerate() {
        let context = format!("load {i}");
        let load = match load_json["type"].as_str() {
            Some("line") => {
                let points = load_json["points"]
                    .members()
                    .map(|p| parse_point(p, &context))
                    .collect::<Result<Vec<_>>>()?;
                Load::Line {
                    points,
                    tx: required_f64(load_json, &context, "tx")?,
                    ty: required_f64(load_json, &context, "ty")?,
                }
            }
            Some("point") => Load::Point {
                point: parse_point(&load_json["point"], &context)?,
                fx: required_f64(load_json, &context, "fx")?,
                fy: required_f64(load_json, &context, "fy")?,
            },
            _ => {
                return Err(FeaError::Input(format!(
                    "Load {i} must have type \"line\" or \"point\""
                )))
            }
        };
        loads.push(load);
    }

    Ok(loads)
}

fn parse_boundary_rules(input_json: &JsonValue) -> Result<Vec<BoundaryRule>> {
    let mut rules: Vec<BoundaryRule> = Vec::new();

    for (name, rule_json) in input_json["boundary_conditions"].entries() {
        if !rule_json.has_key("targets") {
            return Err(FeaError::Input(format!(
                "Boundary rule {name} is missing targets field"
            )));
        }

        let region_json = &rule_json["region"];
        let defaults = BoundaryRegion::default();
        let region = BoundaryRegion {
            x_min: optional_f64(region_json, name, "x_target_min")?.unwrap_or(defaults.x_min),
            x_max: optional_f64(region_json, name, "x_target_max")?.unwrap_or(defaults.x_max),
            y_min: optional_f64(region_json, name, "y_target_min")?.unwrap_or(defaults.y_min),
            y_max: optional_f64(region_json, name, "y_target_max")?.unwrap_or(defaults.y_max),
        };

        if region.x_min > region.x_max {
            return Err(FeaError::Input(format!(
                "Boundary '{name}' has x_target_min greater than x_target_max"
            )));
        }
        if region.y_min > region.y_max {
            return Err(FeaError::Input(format!(
                "Boundary '{name}' has y_target_min greater than y_target_max"
            )));
        }

        let ux = optional_f64(&rule_json["targets"], name, "ux")?;
        let uy = optional_f64(&rule_json["targets"], name, "uy")?;
        if ux.is_none() && uy.is_none() {
            return Err(FeaError::Input(format!(
                "Boundary '{name}' prescribes neither ux nor uy"
            )));
        }

        rules.push(BoundaryRule {
            name: name.to_owned(),
            region,
            ux,
            uy,
        });
    }

    Ok(rules)
}

/// Parses a job description
///
/// # Arguments
/// * `contents` - The job file as a JSON string
pub fn parse_job(contents: &str) -> Result<JobConfig> {
    let input_json = json::parse(contents)
        .map_err(|err| FeaError::Input(format!("Error in input file json: {err}")))?;

    if !input_json.has_key("metadata") {
        return Err(FeaError::Input(
            "Input json missing metadata field".to_owned(),
        ));
    }

    let metadata = parse_metadata(&input_json)?;
    let (mesh, engine) = parse_mesh(&input_json)?;
    let load_mapping = parse_load_mapping(&input_json)?;
    let loads = parse_loads(&input_json)?;
    let boundary_rules = parse_boundary_rules(&input_json)?;

    info!(
        "loaded {} loads and {} boundary rules from input file",
        loads.len(),
        boundary_rules.len()
    );

    Ok(JobConfig {
        metadata,
        mesh,
        engine,
        load_mapping,
        loads,
        boundary_rules,
    })
}

/// Reads and parses a job file from disk
pub fn load_input_file(input_file: &str) -> Result<JobConfig> {
    let contents = std::fs::read_to_string(input_file)
        .map_err(|err| FeaError::Input(format!("Unable to open input file {input_file}: {err}")))?;
    parse_job(&contents)
}
