//! Polygon input files for the command line driver.
//!
//! Two formats are read:
//! * CSV with `x` and `y` columns, one vertex per row, forming the outer ring
//! * SVG where `polyline`, `polygon` and `rect` elements whose id (or parent
//!   id) starts with `OUTER` give the outer ring and `INNER` give holes

use log::warn;

use geofea::{FeaError, PolyRegion, Result, Vertex};

/// Parses a CSV file into an ordered list of vertices
///
/// # Arguments
/// * `contents` - The csv text
pub fn parse_csv(contents: &str) -> Result<Vec<Vertex>> {
    let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());

    let headers: Vec<&str> = lines
        .next()
        .ok_or_else(|| FeaError::Input("Empty csv file".to_owned()))?
        .split(',')
        .map(str::trim)
        .collect();

    let column = |name: &str| {
        headers.iter().position(|h| *h == name).ok_or_else(|| {
            FeaError::Input("Error in csv file: Missing x and/or y field".to_owned())
        })
    };
    let x_index = column("x")?;
    let y_index = column("y")?;

    let mut vertices = Vec::new();
    for line in lines {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |i: usize| -> Result<f64> {
            fields
                .get(i)
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| FeaError::Input(format!("Non-float value in csv row '{line}'")))
        };
        vertices.push(Vertex {
            x: field(x_index)?,
            y: field(y_index)?,
        });
    }

    Ok(vertices)
}

fn item_id<'a>(node: &roxmltree::Node<'a, '_>) -> Option<&'a str> {
    node.attribute("id")
        .or_else(|| node.parent().and_then(|p| p.attribute("id")))
}

fn attribute_f64(node: &roxmltree::Node, name: &str, default: Option<f64>) -> Result<f64> {
    match node.attribute(name) {
        Some(v) => v.trim().parse().map_err(|_| {
            FeaError::Input(format!("Non-float {name} value '{v}' in svg element"))
        }),
        None => default.ok_or_else(|| {
            FeaError::Input(format!("Missing {name} definition in svg element"))
        }),
    }
}

/// Parses SVG geometry into a region. The y axis is flipped so that up is
/// positive.
///
/// # Arguments
/// * `contents` - The svg text
/// * `min_spacing` - Vertices closer than this to the previous one are skipped
pub fn parse_svg(contents: &str, min_spacing: f64) -> Result<PolyRegion> {
    let doc = roxmltree::Document::parse(contents)
        .map_err(|err| FeaError::Input(format!("Error in svg file: {err}")))?;

    let mut outer: Option<Vec<Vertex>> = None;
    let mut holes: Vec<Vec<Vertex>> = Vec::new();
    let mut skipped_vertices = 0usize;

    for node in doc.descendants() {
        let points: Vec<Vertex> = match node.tag_name().name() {
            "polyline" | "polygon" => {
                let raw = node.attribute("points").ok_or_else(|| {
                    FeaError::Input("Error in svg file. No points in polyline element".to_owned())
                })?;
                let values = raw
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(|s| {
                        s.parse::<f64>().map_err(|_| {
                            FeaError::Input(format!("Non-float value '{s}' in svg points"))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()?;

                let mut points: Vec<Vertex> = Vec::new();
                for pair in values.chunks_exact(2) {
                    let vertex = Vertex::new(pair[0], -pair[1]);
                    if points.contains(&vertex) {
                        warn!("duplicate point at {:?} in svg geometry", vertex);
                        continue;
                    }
                    if let Some(last) = points.last() {
                        if last.distance_to(&vertex) < min_spacing {
                            skipped_vertices += 1;
                            continue;
                        }
                    }
                    points.push(vertex);
                }
                points
            }
            "rect" => {
                let x = attribute_f64(&node, "x", Some(0.0))?;
                let y = attribute_f64(&node, "y", Some(0.0))?;
                let width = attribute_f64(&node, "width", None)?;
                let height = attribute_f64(&node, "height", None)?;
                vec![
                    Vertex::new(x, -y - height),
                    Vertex::new(x + width, -y - height),
                    Vertex::new(x + width, -y),
                    Vertex::new(x, -y),
                ]
            }
            _ => continue,
        };

        match item_id(&node).map(str::trim) {
            Some(id) if id.starts_with("INNER") => holes.push(points),
            Some(id) if id.starts_with("OUTER") => {
                if outer.replace(points).is_some() {
                    return Err(FeaError::Input(
                        "Multiple OUTER geometries in SVG".to_owned(),
                    ));
                }
            }
            Some(id) => {
                warn!("skipping svg geometry with id {id}. Only OUTER and INNER are supported")
            }
            None => {
                return Err(FeaError::Input(
                    "Error in svg file. Missing id field on geometry".to_owned(),
                ))
            }
        }
    }

    if skipped_vertices > 0 {
        warn!("skipped {skipped_vertices} closely spaced svg vertices");
    }

    let outer = outer.ok_or_else(|| FeaError::Input("No OUTER geometry".to_owned()))?;
    let mut region = PolyRegion::new("OUTER", outer)?;
    for hole in holes {
        region = region.with_hole(hole)?;
    }

    Ok(region)
}

/// Loads a region from a `.csv` or `.svg` file
pub fn load_region(path: &str, min_spacing: f64) -> Result<PolyRegion> {
    let contents = std::fs::read_to_string(path)
        .map_err(|err| FeaError::Input(format!("Unable to open geometry file {path}: {err}")))?;

    if path.ends_with(".svg") {
        parse_svg(&contents, min_spacing)
    } else if path.ends_with(".csv") {
        PolyRegion::new(path, parse_csv(&contents)?)
    } else {
        Err(FeaError::Input(format!(
            "Unrecognized geometry filetype {path}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_columns_can_be_reordered() {
        let vertices = parse_csv("y, x\n0, 0\n0, 12\n12, 12\n").unwrap();
        assert_eq!(
            vertices,
            vec![
                Vertex::new(0., 0.),
                Vertex::new(12., 0.),
                Vertex::new(12., 12.)
            ]
        );
        assert!(parse_csv("a,b\n1,2\n").is_err());
        assert!(parse_csv("x,y\n1,oops\n").is_err());
    }

    #[test]
    fn svg_outer_and_inner() {
        let svg = r#"<svg xmlns="http://www.w3.org/2000/svg">
            <polygon id="OUTER" points="0,0 10,0 10,10 0,10" />
            <g id="INNER-1"><rect x="2" y="2" width="3" height="3" /></g>
            <polyline id="sketch" points="0,0 1,1" />
        </svg>"#;
        let region = parse_svg(svg, 0.0).unwrap();

        assert_eq!(region.outer.len(), 4);
        assert_eq!(region.outer[2], Vertex::new(10., -10.));
        assert_eq!(region.holes.len(), 1);
        assert_eq!(region.holes[0][0], Vertex::new(2., -5.));
    }

    #[test]
    fn svg_without_outer_fails() {
        let svg = r#"<svg><polygon id="INNER" points="0,0 1,0 1,1" /></svg>"#;
        assert!(parse_svg(svg, 0.0).is_err());
    }
}
