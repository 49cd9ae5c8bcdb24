//! CPU-side source mesh data.
//!
//! The baker does not own a scene graph; callers hand it mesh data in this
//! form, typically converted from whatever asset pipeline they use. Indices
//! are grouped into submesh ranges so individual submeshes can be excluded
//! from a bake.

use glam::{Vec2, Vec3};

use crate::error::{BakeError, BakeResult};

/// A contiguous range of the index buffer belonging to one submesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmeshRange {
    /// Offset into the index buffer, in indices.
    pub start: u32,
    /// Number of indices. Always a multiple of 3.
    pub count: u32,
}

/// Triangle mesh input for the weld stage.
#[derive(Debug, Clone)]
pub struct SourceMesh {
    name: String,
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Vec<Vec2>,
    indices: Vec<u32>,
    submeshes: Vec<SubmeshRange>,
}

impl SourceMesh {
    /// Build a mesh from complete vertex data, validating consistency.
    pub fn new(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Vec<Vec2>,
        indices: Vec<u32>,
        submeshes: Vec<SubmeshRange>,
    ) -> BakeResult<Self> {
        let name = name.into();

        if positions.is_empty() {
            return Err(BakeError::InvalidInput(format!(
                "mesh '{}' has no vertices",
                name
            )));
        }
        if normals.len() != positions.len() || uvs.len() != positions.len() {
            return Err(BakeError::InvalidInput(format!(
                "mesh '{}' attribute counts disagree: {} positions, {} normals, {} uvs",
                name,
                positions.len(),
                normals.len(),
                uvs.len()
            )));
        }
        if submeshes.is_empty() {
            return Err(BakeError::InvalidInput(format!(
                "mesh '{}' has no submeshes",
                name
            )));
        }
        for (i, range) in submeshes.iter().enumerate() {
            if range.count % 3 != 0 {
                return Err(BakeError::InvalidInput(format!(
                    "mesh '{}' submesh {} index count {} is not a triangle list",
                    name, i, range.count
                )));
            }
            let end = range.start as u64 + range.count as u64;
            if end > indices.len() as u64 {
                return Err(BakeError::InvalidInput(format!(
                    "mesh '{}' submesh {} range {}..{} exceeds {} indices",
                    name,
                    i,
                    range.start,
                    end,
                    indices.len()
                )));
            }
        }
        if let Some(&bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(BakeError::InvalidInput(format!(
                "mesh '{}' index {} out of range ({} vertices)",
                name,
                bad,
                positions.len()
            )));
        }

        Ok(Self {
            name,
            positions,
            normals,
            uvs,
            indices,
            submeshes,
        })
    }

    /// Convenience constructor for meshes without authored normals or UVs:
    /// smooth vertex normals are accumulated from face normals, UVs are zero.
    pub fn with_computed_normals(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
        submeshes: Vec<SubmeshRange>,
    ) -> BakeResult<Self> {
        let mut normals = vec![Vec3::ZERO; positions.len()];
        for tri in indices.chunks_exact(3) {
            let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
            if a >= positions.len() || b >= positions.len() || c >= positions.len() {
                // Index validation happens in new(); skip here to report the
                // offending index rather than panicking.
                continue;
            }
            let face = (positions[b] - positions[a]).cross(positions[c] - positions[a]);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        for n in &mut normals {
            *n = n.normalize_or_zero();
        }

        let uvs = vec![Vec2::ZERO; positions.len()];
        Self::new(name, positions, normals, uvs, indices, submeshes)
    }

    /// Single-submesh convenience wrapper around
    /// [`SourceMesh::with_computed_normals`].
    pub fn single_submesh(
        name: impl Into<String>,
        positions: Vec<Vec3>,
        indices: Vec<u32>,
    ) -> BakeResult<Self> {
        let range = SubmeshRange {
            start: 0,
            count: indices.len() as u32,
        };
        Self::with_computed_normals(name, positions, indices, vec![range])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vec3] {
        &self.normals
    }

    pub fn uvs(&self) -> &[Vec2] {
        &self.uvs
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    pub fn submesh_count(&self) -> usize {
        self.submeshes.len()
    }

    pub fn submesh(&self, index: usize) -> SubmeshRange {
        self.submeshes[index]
    }

    /// Index count of one submesh.
    pub fn submesh_index_count(&self, index: usize) -> u32 {
        self.submeshes[index].count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vec3>, Vec<u32>) {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
        ];
        let indices = vec![0, 1, 2, 0, 2, 3];
        (positions, indices)
    }

    #[test]
    fn computed_normals_face_out_of_plane() {
        let (positions, indices) = quad();
        let mesh = SourceMesh::single_submesh("quad", positions, indices).unwrap();
        for n in mesh.normals() {
            assert!((*n - Vec3::Z).length() < 1e-6, "normal {:?} not +Z", n);
        }
    }

    #[test]
    fn rejects_out_of_range_index() {
        let (positions, mut indices) = quad();
        indices[4] = 9;
        let err = SourceMesh::single_submesh("quad", positions, indices);
        assert!(err.is_err());
    }

    #[test]
    fn rejects_non_triangle_submesh() {
        let (positions, _) = quad();
        let err = SourceMesh::with_computed_normals(
            "quad",
            positions,
            vec![0, 1, 2, 3],
            vec![SubmeshRange { start: 0, count: 4 }],
        );
        assert!(err.is_err());
    }

    #[test]
    fn rejects_submesh_range_past_indices() {
        let (positions, indices) = quad();
        let err = SourceMesh::with_computed_normals(
            "quad",
            positions,
            indices,
            vec![SubmeshRange { start: 3, count: 6 }],
        );
        assert!(err.is_err());
    }
}
