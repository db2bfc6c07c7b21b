use std::io::Cursor;
use std::path::{Path, PathBuf};

use glam::Vec3;
use log::{debug, warn};
use parking_lot::Mutex;

use super::io::read_file;
use crate::backend::{BackendId, MeshUpload, RenderBackend};
use crate::errors::{ResourceError, TaskResult};
use crate::resource::{Resource, ResourceKind};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Bounds of `points`; `None` when empty.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        Some(points.fold(Self { min: first, max: first }, |aabb, p| Self {
            min: aabb.min.min(p),
            max: aabb.max.max(p),
        }))
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    #[inline]
    #[must_use]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }
}

#[derive(Debug)]
struct SubMesh {
    name: String,
    positions: Vec<f32>,
    normals: Vec<f32>,
    texcoords: Vec<f32>,
    indices: Vec<u32>,
}

/// A Wavefront OBJ model; one backend mesh per object/group in the file.
///
/// Materials are ignored.
#[derive(Debug)]
pub struct Model {
    path: PathBuf,
    staging: Mutex<Option<Vec<SubMesh>>>,
    bounds: Mutex<Option<Aabb>>,
    mesh_ids: Mutex<Vec<BackendId>>,
}

impl Model {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging: Mutex::new(None),
            bounds: Mutex::new(None),
            mesh_ids: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bounds of all sub-meshes, known once the file was parsed.
    #[must_use]
    pub fn bounds(&self) -> Option<Aabb> {
        *self.bounds.lock()
    }

    /// Backend mesh ids in file order; empty until uploaded.
    #[must_use]
    pub fn mesh_ids(&self) -> Vec<BackendId> {
        self.mesh_ids.lock().clone()
    }

    fn parse(path: &Path, bytes: &[u8]) -> Result<Vec<SubMesh>, ResourceError> {
        let (models, _materials) = tobj::load_obj_buf(
            &mut Cursor::new(bytes),
            &tobj::GPU_LOAD_OPTIONS,
            |_| Err(tobj::LoadError::OpenFileFailed),
        )
        .map_err(|err| ResourceError::decode(path, err))?;

        // tobj reports an empty `unnamed_object` for files without geometry.
        let meshes: Vec<SubMesh> = models
            .into_iter()
            .filter(|model| !model.mesh.positions.is_empty())
            .map(|model| SubMesh {
                name: model.name,
                positions: model.mesh.positions,
                normals: model.mesh.normals,
                texcoords: model.mesh.texcoords,
                indices: model.mesh.indices,
            })
            .collect();
        if meshes.is_empty() {
            return Err(ResourceError::decode(path, "no geometry in OBJ file"));
        }
        Ok(meshes)
    }

    fn delete_meshes(backend: &mut dyn RenderBackend, ids: impl IntoIterator<Item = BackendId>) {
        for id in ids {
            backend.delete_object(id);
        }
    }
}

impl Resource for Model {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Model
    }

    fn source(&self) -> String {
        self.path.display().to_string()
    }

    fn load_io_data(&self) -> TaskResult {
        let bytes = read_file(&self.path)?;
        let meshes = Self::parse(&self.path, &bytes)?;

        let bounds = meshes
            .iter()
            .filter_map(|mesh| {
                Aabb::from_points(mesh.positions.chunks_exact(3).map(Vec3::from_slice))
            })
            .reduce(Aabb::union);
        if bounds.is_none() {
            warn!("'{}' has no vertices", self.path.display());
        }
        debug!(
            "Parsed '{}': {} sub-mesh(es), bounds {bounds:?}",
            self.path.display(),
            meshes.len()
        );

        *self.bounds.lock() = bounds;
        *self.staging.lock() = Some(meshes);
        Ok(())
    }

    fn upload_buffers(&self, backend: &mut dyn RenderBackend) -> TaskResult {
        let meshes = self
            .staging
            .lock()
            .take()
            .ok_or_else(|| ResourceError::MissingStagingData(self.source()))?;

        let mut created = Vec::with_capacity(meshes.len());
        for mesh in &meshes {
            let upload = MeshUpload {
                label: &mesh.name,
                positions: &mesh.positions,
                normals: &mesh.normals,
                texcoords: &mesh.texcoords,
                indices: &mesh.indices,
            };
            match backend.create_mesh(&upload) {
                Ok(id) => created.push(id),
                Err(reason) => {
                    Self::delete_meshes(backend, created);
                    return Err(ResourceError::Backend(format!(
                        "{} ({}): {reason}",
                        self.source(),
                        mesh.name
                    )));
                }
            }
        }

        let old = std::mem::replace(&mut *self.mesh_ids.lock(), created);
        Self::delete_meshes(backend, old);
        Ok(())
    }

    fn release_data(&self) {
        self.staging.lock().take();
    }

    fn free_backend(&self, backend: &mut dyn RenderBackend) {
        let ids = std::mem::take(&mut *self.mesh_ids.lock());
        Self::delete_meshes(backend, ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUAD: &str = "\
o quad
v -1.0 0.0 -2.0
v 1.0 0.0 -2.0
v 1.0 3.0 2.0
v -1.0 3.0 2.0
f 1 2 3 4
";

    #[test]
    fn test_parse_triangulates() {
        let meshes = Model::parse(Path::new("quad.obj"), QUAD.as_bytes()).unwrap();
        assert_eq!(meshes.len(), 1);
        assert_eq!(meshes[0].name, "quad");
        assert_eq!(meshes[0].positions.len(), 4 * 3);
        assert_eq!(meshes[0].indices.len(), 6);
    }

    #[test]
    fn test_aabb_from_points() {
        let aabb = Aabb::from_points([Vec3::new(1.0, -2.0, 0.0), Vec3::new(-1.0, 4.0, 3.0)]).unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 4.0, 3.0));
        assert_eq!(aabb.center(), Vec3::new(0.0, 1.0, 1.5));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }

    #[test]
    fn test_empty_obj_is_decode_error() {
        let err = Model::parse(Path::new("empty.obj"), b"# nothing\n").unwrap_err();
        assert!(matches!(err, ResourceError::Decode { .. }));
    }
}
