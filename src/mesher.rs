//! Polygon triangulation.
//!
//! Two strategies sit behind [`Triangulator`]:
//!
//! * [`GmshMesher`] drives an external Gmsh binary to build a constrained
//!   Delaunay mesh that follows the polygon and hole boundaries exactly.
//! * [`GridMesher`] overlays a structured grid on the bounding box and keeps
//!   the triangles whose centroids fall inside the region. It needs nothing
//!   external, but its boundary is a staircase approximation of the polygon,
//!   so prefer Gmsh whenever it is installed.
//!
//! [`AutoMesher`] tries the first and falls back to the second.

use std::{
    collections::BTreeMap,
    path::PathBuf,
    process::Command,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{debug, info, warn};

use crate::{
    datatypes::{Element, Mesh, PolyRegion, Vertex},
    element::checked_area,
    error::{FeaError, Result},
};

pub const DEFAULT_GRID_RESOLUTION: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshOptions {
    /// Upper bound on triangle area, in squared mesh units
    pub max_area: Option<f64>,
    /// Requested minimum interior angle in degrees
    pub min_angle: f64,
    /// Cells per side of the fallback grid
    pub grid_resolution: usize,
}

impl Default for MeshOptions {
    fn default() -> Self {
        MeshOptions {
            max_area: None,
            min_angle: 30.0,
            grid_resolution: DEFAULT_GRID_RESOLUTION,
        }
    }
}

/// A meshing strategy
pub trait Triangulator {
    fn triangulate(&self, region: &PolyRegion, options: &MeshOptions) -> Result<Mesh>;

    fn name(&self) -> &str;
}

/// Signed area of a closed ring; positive when counter-clockwise
pub fn polygon_area(ring: &[Vertex]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }

    let mut area = 0.0;
    for (i, a) in ring.iter().enumerate() {
        let b = &ring[(i + 1) % ring.len()];
        area += a.x * b.y - b.x * a.y;
    }
    0.5 * area
}

/// Even-odd ray casting test
pub fn point_in_polygon(point: &Vertex, ring: &[Vertex]) -> bool {
    let n = ring.len();
    if n < 3 {
        return false;
    }

    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let vi = &ring[i];
        let vj = &ring[j];

        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }

    inside
}

fn bounding_box(ring: &[Vertex]) -> (Vertex, Vertex) {
    ring.iter().fold(
        (
            Vertex::new(f64::INFINITY, f64::INFINITY),
            Vertex::new(f64::NEG_INFINITY, f64::NEG_INFINITY),
        ),
        |(lo, hi), v| {
            (
                Vertex::new(lo.x.min(v.x), lo.y.min(v.y)),
                Vertex::new(hi.x.max(v.x), hi.y.max(v.y)),
            )
        },
    )
}

/// Drops nodes no element references and renumbers the rest in their
/// original order
fn compact(nodes: Vec<Vertex>, elements: Vec<Element>) -> Result<Mesh> {
    let mut remap: Vec<Option<usize>> = vec![None; nodes.len()];
    for element in &elements {
        for n in element.nodes {
            remap[n] = Some(0);
        }
    }

    let mut kept: Vec<Vertex> = Vec::new();
    for (i, node) in nodes.into_iter().enumerate() {
        if remap[i].is_some() {
            remap[i] = Some(kept.len());
            kept.push(node);
        }
    }

    let mut renumbered = Vec::with_capacity(elements.len());
    for element in elements {
        let mut ids = [0usize; 3];
        for (slot, n) in ids.iter_mut().zip(element.nodes) {
            *slot = remap[n].ok_or_else(|| {
                FeaError::Mesher(format!("Node {n} lost while compacting mesh"))
            })?;
        }
        renumbered.push(Element { nodes: ids });
    }

    Mesh::new(kept, renumbered)
}

/// Structured grid with centroid-in-region culling
#[derive(Debug, Clone, Copy, Default)]
pub struct GridMesher;

impl Triangulator for GridMesher {
    fn triangulate(&self, region: &PolyRegion, options: &MeshOptions) -> Result<Mesh> {
        if polygon_area(&region.outer).abs() <= f64::EPSILON {
            warn!(
                "region '{}' encloses no area; producing an empty mesh",
                region.name
            );
            return Ok(Mesh::empty());
        }

        let n = options.grid_resolution.max(1);
        if options.max_area.is_some() {
            debug!("grid mesher ignores max_area; using {n}x{n} cells");
        }

        let (lo, hi) = bounding_box(&region.outer);
        let dx = (hi.x - lo.x) / n as f64;
        let dy = (hi.y - lo.y) / n as f64;

        let mut nodes = Vec::with_capacity((n + 1) * (n + 1));
        for j in 0..=n {
            for i in 0..=n {
                nodes.push(Vertex::new(lo.x + i as f64 * dx, lo.y + j as f64 * dy));
            }
        }

        let nid = |i: usize, j: usize| j * (n + 1) + i;
        let mut elements = Vec::new();
        let mut skipped = 0usize;

        for j in 0..n {
            for i in 0..n {
                let n1 = nid(i, j);
                let n2 = nid(i + 1, j);
                let n3 = nid(i, j + 1);
                let n4 = nid(i + 1, j + 1);

                for tri in [[n1, n2, n4], [n1, n4, n3]] {
                    let corners = tri.map(|k| nodes[k]);
                    if checked_area(&corners).is_err() {
                        skipped += 1;
                        continue;
                    }

                    let centroid = Vertex::new(
                        (corners[0].x + corners[1].x + corners[2].x) / 3.0,
                        (corners[0].y + corners[1].y + corners[2].y) / 3.0,
                    );
                    let inside = point_in_polygon(&centroid, &region.outer)
                        && !region
                            .holes
                            .iter()
                            .any(|hole| point_in_polygon(&centroid, hole));

                    if inside {
                        elements.push(Element { nodes: tri });
                    }
                }
            }
        }

        if skipped > 0 {
            warn!("grid mesher skipped {skipped} degenerate triangles");
        }

        compact(nodes, elements)
    }

    fn name(&self) -> &str {
        "grid"
    }
}

enum MeshParseState {
    Nodes,
    Elements,
    Limbo,
}

/// Constrained Delaunay meshing through the Gmsh command line tool
#[derive(Debug, Clone)]
pub struct GmshMesher {
    pub executable: String,
    pub work_dir: PathBuf,
}

impl Default for GmshMesher {
    fn default() -> Self {
        GmshMesher {
            executable: "gmsh".to_owned(),
            work_dir: std::env::temp_dir(),
        }
    }
}

impl GmshMesher {
    /// Builds a .geo script for a region
    ///
    /// # Arguments
    /// * `region` - Outer ring and holes to mesh
    /// * `options` - Area and quality bounds
    ///
    /// # Returns
    /// The script contents. It holds no `Mesh` command; the surface is meshed
    /// once, by the `-2` flag on the command line.
    pub fn build_geo(region: &PolyRegion, options: &MeshOptions) -> String {
        let (lo, hi) = bounding_box(&region.outer);
        // edge of an equilateral triangle with the requested area
        let cl = match options.max_area {
            Some(area) if area > 0.0 => f64::sqrt(4.0 * area / f64::sqrt(3.0)),
            _ => f64::max(hi.x - lo.x, hi.y - lo.y) / 10.0,
        };

        let mut geo = String::new();
        let mut point_tag = 1;
        let mut loop_tags = Vec::new();

        let rings = std::iter::once(&region.outer).chain(region.holes.iter());
        for (ring_idx, ring) in rings.enumerate() {
            geo.push_str(&format!("// Ring {ring_idx}\n"));
            let first = point_tag;
            for vertex in ring {
                geo.push_str(&format!(
                    "Point({point_tag}) = {{ {}, {}, 0, {cl} }};\n",
                    vertex.x, vertex.y
                ));
                point_tag += 1;
            }

            let mut line_tags = Vec::with_capacity(ring.len());
            for k in 0..ring.len() {
                let a = first + k;
                let b = first + (k + 1) % ring.len();
                geo.push_str(&format!("Line({a}) = {{ {a}, {b} }};\n"));
                line_tags.push(a.to_string());
            }

            let loop_tag = ring_idx + 1;
            geo.push_str(&format!(
                "Line Loop({loop_tag}) = {{ {} }};\n",
                line_tags.join(", ")
            ));
            loop_tags.push(loop_tag.to_string());
        }

        geo.push_str(&format!(
            "Plane Surface(1) = {{ {} }};\n",
            loop_tags.join(", ")
        ));
        geo.push_str("Mesh.ElementOrder = 1;\n");
        geo.push_str("Mesh.Algorithm = 5;\n");
        geo.push_str(&format!("Mesh.CharacteristicLengthMax = {cl};\n"));
        if options.min_angle > 0.0 {
            geo.push_str("Mesh.Optimize = 1;\n");
        }

        geo
    }

    /// Parses an ASCII .msh (version 4) file into a mesh of linear triangles
    pub fn parse_msh(contents: &str) -> Result<Mesh> {
        let bad = |what: &str| FeaError::Mesher(format!("Malformed mesh file: {what}"));
        let ints = |line: &str| -> Result<Vec<usize>> {
            line.split_whitespace()
                .map(|t| t.parse().map_err(|_| bad(line)))
                .collect()
        };

        let mut parser_state = MeshParseState::Limbo;
        let mut parsed_section_metadata = false;
        let mut lines = contents.lines().map(str::trim).filter(|l| !l.is_empty());

        // tag -> coordinates; BTreeMap keeps nodes in tag order
        let mut tagged_nodes: BTreeMap<usize, Vertex> = BTreeMap::new();
        let mut tagged_elements: Vec<[usize; 3]> = Vec::new();

        while let Some(line) = lines.next() {
            if line.starts_with("$End") {
                parser_state = MeshParseState::Limbo;
                continue;
            }

            match parser_state {
                MeshParseState::Limbo => {
                    parsed_section_metadata = false;
                    if line == "$Nodes" {
                        parser_state = MeshParseState::Nodes;
                    } else if line == "$Elements" {
                        parser_state = MeshParseState::Elements;
                    }
                }
                MeshParseState::Nodes => {
                    if !parsed_section_metadata {
                        parsed_section_metadata = true;
                        continue;
                    }

                    let block = ints(line)?;
                    let count = *block.get(3).ok_or_else(|| bad(line))?;

                    let mut tags = Vec::with_capacity(count);
                    for _ in 0..count {
                        let tag_line = lines.next().ok_or_else(|| bad("missing node tag"))?;
                        tags.push(tag_line.parse::<usize>().map_err(|_| bad(tag_line))?);
                    }
                    for tag in tags {
                        let coord_line = lines.next().ok_or_else(|| bad("missing node coords"))?;
                        let coords: Vec<f64> = coord_line
                            .split_whitespace()
                            .map(|c| c.parse().map_err(|_| bad(coord_line)))
                            .collect::<Result<_>>()?;
                        if coords.len() < 2 {
                            return Err(bad(coord_line));
                        }
                        tagged_nodes.insert(tag, Vertex::new(coords[0], coords[1]));
                    }
                }
                MeshParseState::Elements => {
                    if !parsed_section_metadata {
                        parsed_section_metadata = true;
                        continue;
                    }

                    let block = ints(line)?;
                    if block.len() < 4 {
                        return Err(bad(line));
                    }
                    let (entity_dim, element_type, count) = (block[0], block[2], block[3]);

                    for _ in 0..count {
                        let data = ints(lines.next().ok_or_else(|| bad("missing element"))?)?;
                        // type 2 is the 3-node triangle
                        if entity_dim != 2 || element_type != 2 {
                            continue;
                        }
                        if data.len() < 4 {
                            return Err(bad("short triangle record"));
                        }
                        tagged_elements.push([data[1], data[2], data[3]]);
                    }
                }
            }
        }

        let index: BTreeMap<usize, usize> = tagged_nodes
            .keys()
            .enumerate()
            .map(|(i, tag)| (*tag, i))
            .collect();

        let mut elements = Vec::with_capacity(tagged_elements.len());
        for tags in tagged_elements {
            let mut ids = [0usize; 3];
            for (slot, tag) in ids.iter_mut().zip(tags) {
                *slot = *index
                    .get(&tag)
                    .ok_or_else(|| bad(&format!("element references unknown node {tag}")))?;
            }
            elements.push(Element { nodes: ids });
        }

        compact(tagged_nodes.into_values().collect(), elements)
    }
}

static SCRATCH_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// File stem unique to this process and call, so concurrent meshers sharing
/// a work directory never read each other's output
fn scratch_stem() -> String {
    let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("geofea-{}-{n}", std::process::id())
}

impl Triangulator for GmshMesher {
    fn triangulate(&self, region: &PolyRegion, options: &MeshOptions) -> Result<Mesh> {
        let stem = scratch_stem();
        let geo_filepath = self.work_dir.join(format!("{stem}.geo"));
        let msh_filepath = self.work_dir.join(format!("{stem}.msh"));

        std::fs::write(&geo_filepath, Self::build_geo(region, options))?;

        info!("running {}...", self.executable);
        let output = Command::new(&self.executable)
            .arg(&geo_filepath)
            .arg("-2")
            .arg("-format")
            .arg("msh4")
            .arg("-o")
            .arg(&msh_filepath)
            .output();
        let _ = std::fs::remove_file(&geo_filepath);

        let output = output.map_err(|err| FeaError::Mesher(format!("Gmsh failed: {err}")))?;
        if !output.status.success() {
            let _ = std::fs::remove_file(&msh_filepath);
            return Err(FeaError::Mesher(format!(
                "Gmsh exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let contents = std::fs::read_to_string(&msh_filepath)?;
        let _ = std::fs::remove_file(&msh_filepath);

        Self::parse_msh(&contents)
    }

    fn name(&self) -> &str {
        "gmsh"
    }
}

/// Gmsh when it runs, otherwise the structured grid
#[derive(Debug, Clone, Default)]
pub struct AutoMesher {
    pub primary: GmshMesher,
    pub fallback: GridMesher,
}

impl Triangulator for AutoMesher {
    fn triangulate(&self, region: &PolyRegion, options: &MeshOptions) -> Result<Mesh> {
        match self.primary.triangulate(region, options) {
            Ok(mesh) if !mesh.is_empty() => Ok(mesh),
            Ok(_) => {
                warn!("gmsh produced no triangles; falling back to the grid mesher");
                self.fallback.triangulate(region, options)
            }
            Err(err) => {
                warn!("{err}; falling back to the grid mesher");
                self.fallback.triangulate(region, options)
            }
        }
    }

    fn name(&self) -> &str {
        "auto"
    }
}

/// Meshes a region with the given strategy and logs the result
pub fn run(
    triangulator: &dyn Triangulator,
    region: &PolyRegion,
    options: &MeshOptions,
) -> Result<Mesh> {
    let mesh = triangulator.triangulate(region, options)?;

    if mesh.is_empty() {
        warn!("region '{}' produced no elements", region.name);
    } else {
        info!(
            "{} mesher loaded {} nodes and {} elements",
            triangulator.name(),
            mesh.node_count(),
            mesh.elements().len()
        );
    }

    Ok(mesh)
}

/// Meshes a bare vertex ring with [`AutoMesher`]. Rings with fewer than three
/// vertices or no enclosed area give an empty mesh.
pub fn mesh_polygon(vertices: &[Vertex], options: &MeshOptions) -> Result<Mesh> {
    if vertices.len() < 3 || polygon_area(vertices).abs() <= f64::EPSILON {
        warn!("polygon with {} vertices encloses no area", vertices.len());
        return Ok(Mesh::empty());
    }

    let region = PolyRegion::new("polygon", vertices.to_vec())?;
    run(&AutoMesher::default(), &region, options)
}
