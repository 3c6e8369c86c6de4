use crate::scene::{
    Material, MaterialId, MaterialKey, MaterialLibrary, MeshData, MeshId, MeshNode, Model, Node,
    TextureId,
};
use glam::Mat4;
use gltf::image::Format;
use image::RgbaImage;
use std::collections::HashMap;

/// Converts an imported glTF document into the viewer's node tree.
///
/// A glTF mesh with one primitive becomes a single mesh node; with several
/// primitives it becomes a group with one mesh child per primitive.
pub(super) fn build_model(
    document: &gltf::Document,
    buffers: &[gltf::buffer::Data],
    images: &[gltf::image::Data],
) -> Model {
    let mut importer = Importer {
        buffers,
        images,
        meshes: Vec::new(),
        mesh_parts: HashMap::new(),
        materials: MaterialLibrary::new(),
        material_ids: HashMap::new(),
        textures: Vec::new(),
        texture_ids: HashMap::new(),
    };

    let mut root = Node::group("model");
    match document.default_scene().or_else(|| document.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                let converted = importer.node(&node);
                root.children.push(converted);
            }
        }
        None => log::warn!("glTF document has no scenes"),
    }

    Model {
        root,
        meshes: importer.meshes,
        materials: importer.materials,
        textures: importer.textures,
    }
}

struct Importer<'a> {
    buffers: &'a [gltf::buffer::Data],
    images: &'a [gltf::image::Data],
    meshes: Vec<MeshData>,
    // glTF mesh index -> converted primitives
    mesh_parts: HashMap<usize, Vec<MeshNode>>,
    materials: MaterialLibrary,
    // None is the glTF default material
    material_ids: HashMap<Option<usize>, MaterialId>,
    textures: Vec<RgbaImage>,
    texture_ids: HashMap<usize, Option<TextureId>>,
}

impl Importer<'_> {
    fn node(&mut self, node: &gltf::Node) -> Node {
        let name = node
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("node_{}", node.index()));
        let transform = Mat4::from_cols_array_2d(&node.transform().matrix());

        let mut converted = match node.mesh() {
            Some(mesh) => {
                let mut parts = self.mesh(&mesh);
                if parts.len() == 1 {
                    Node::mesh(name, parts.remove(0))
                } else {
                    let mut group = Node::group(name.clone());
                    for (i, part) in parts.into_iter().enumerate() {
                        group.children.push(Node::mesh(format!("{name}_{i}"), part));
                    }
                    group
                }
            }
            None => Node::group(name),
        }
        .with_transform(transform);

        for child in node.children() {
            let child = self.node(&child);
            converted.children.push(child);
        }
        converted
    }

    fn mesh(&mut self, mesh: &gltf::Mesh) -> Vec<MeshNode> {
        if let Some(parts) = self.mesh_parts.get(&mesh.index()) {
            return parts.clone();
        }

        let buffers = self.buffers;
        let mut parts = Vec::new();
        for primitive in mesh.primitives() {
            if primitive.mode() != gltf::mesh::Mode::Triangles {
                log::warn!(
                    "Skipping {:?} primitive in mesh {}",
                    primitive.mode(),
                    mesh.index()
                );
                continue;
            }
            let reader =
                primitive.reader(|buffer| buffers.get(buffer.index()).map(|d| d.0.as_slice()));
            let Some(positions) = reader.read_positions() else {
                log::warn!("Skipping primitive without positions in mesh {}", mesh.index());
                continue;
            };
            let positions: Vec<[f32; 3]> = positions.collect();
            let normals = reader
                .read_normals()
                .map(|normals| normals.collect())
                .unwrap_or_default();
            let uvs = reader
                .read_tex_coords(0)
                .map(|uvs| uvs.into_f32().collect())
                .unwrap_or_default();
            let indices = reader
                .read_indices()
                .map(|indices| indices.into_u32().collect())
                .unwrap_or_else(|| (0..positions.len() as u32).collect());

            let mut data = MeshData {
                positions,
                normals,
                uvs,
                indices,
            };
            data.ensure_normals();
            self.meshes.push(data);
            let mesh_id = MeshId(self.meshes.len() - 1);

            let material = self.material(primitive.material());
            parts.push(MeshNode::new(mesh_id, material));
        }

        self.mesh_parts.insert(mesh.index(), parts.clone());
        parts
    }

    fn material(&mut self, material: gltf::Material) -> MaterialId {
        let index = material.index();
        if let Some(id) = self.material_ids.get(&index) {
            return *id;
        }

        let name = match (material.name(), index) {
            (Some(name), _) => name.to_string(),
            (None, Some(i)) => format!("material_{i}"),
            (None, None) => "default".to_string(),
        };
        let pbr = material.pbr_metallic_roughness();
        let mut converted = Material::new(MaterialKey::new(name));
        converted.base_color = pbr.base_color_factor();
        converted.metallic = pbr.metallic_factor();
        converted.roughness = pbr.roughness_factor();
        converted.transparent = material.alpha_mode() == gltf::material::AlphaMode::Blend;
        converted.base_color_texture = pbr
            .base_color_texture()
            .and_then(|info| self.texture(info.texture().source().index()));

        let id = self.materials.push(converted);
        self.material_ids.insert(index, id);
        id
    }

    fn texture(&mut self, image_index: usize) -> Option<TextureId> {
        if let Some(id) = self.texture_ids.get(&image_index) {
            return *id;
        }
        let id = self.images.get(image_index).and_then(to_rgba).map(|image| {
            self.textures.push(image);
            TextureId(self.textures.len() - 1)
        });
        self.texture_ids.insert(image_index, id);
        id
    }
}

fn to_rgba(data: &gltf::image::Data) -> Option<RgbaImage> {
    let pixels = &data.pixels;
    let rgba: Vec<u8> = match data.format {
        Format::R8G8B8A8 => pixels.clone(),
        Format::R8G8B8 => pixels
            .chunks_exact(3)
            .flat_map(|p| [p[0], p[1], p[2], 255])
            .collect(),
        Format::R8G8 => pixels
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[0], p[0], p[1]])
            .collect(),
        Format::R8 => pixels.iter().flat_map(|&v| [v, v, v, 255]).collect(),
        other => {
            log::warn!("Unsupported glTF texture format {:?}; texture dropped", other);
            return None;
        }
    };
    RgbaImage::from_raw(data.width, data.height, rgba)
}


#[cfg(test)]
mod tests {
    use super::build_model;
    use super::fixtures::{
        blended_material, opaque_material, primitive, scratch_dir, write_gltf, TriangleFixture,
    };
    use crate::scene::{Model, NodeKind};
    use glam::Vec3;
    use serde_json::json;

    fn import(name: &str, fixture: &TriangleFixture) -> Model {
        let dir = scratch_dir(name);
        let path = write_gltf(&dir, "scene.gltf", fixture);
        let (document, buffers, images) = gltf::import(path).unwrap();
        build_model(&document, &buffers, &images)
    }

    #[test]
    fn single_primitive_node_becomes_mesh_node() {
        let model = import("gltf-single", &TriangleFixture::single("LensesMat"));
        assert_eq!(model.root.children.len(), 1);
        let node = &model.root.children[0];
        assert_eq!(node.name, "Lens");
        assert!(matches!(node.kind, NodeKind::Mesh(_)));
        let origin = node.transform.transform_point3(Vec3::ZERO);
        assert!((origin - Vec3::X).length() < 1e-6);

        let material = model.materials.iter().next().unwrap();
        assert_eq!(material.key.as_str(), "LensesMat");
        assert!(material.transparent);
        assert_eq!(material.base_color, [1.0, 1.0, 1.0, 0.5]);
        assert!((material.metallic - 0.2).abs() < 1e-6);
        assert!((material.roughness - 0.4).abs() < 1e-6);
        assert!(material.environment().is_none());
    }

    #[test]
    fn multi_primitive_mesh_becomes_group_of_meshes() {
        let fixture = TriangleFixture::new(
            json!([{ "name": "Glasses", "mesh": 0 }]),
            json!([{ "primitives": [primitive(0), primitive(1), primitive(0)] }]),
            json!([opaque_material("Frame"), blended_material("LensesMat")]),
        );
        let model = import("gltf-multi", &fixture);
        let glasses = &model.root.children[0];
        assert!(matches!(glasses.kind, NodeKind::Group));
        assert_eq!(glasses.children.len(), 3);
        assert_eq!(glasses.children[1].name, "Glasses_1");
        assert_eq!(model.mesh_count(), 3);
        // shared material converted once
        assert_eq!(model.materials.len(), 2);
        assert!(!model.materials.iter().next().unwrap().transparent);
    }

    #[test]
    fn node_hierarchy_and_mesh_reuse_are_preserved() {
        let fixture = TriangleFixture::new(
            json!([
                { "name": "Parent", "children": [1], "scale": [2.0, 2.0, 2.0] },
                { "name": "Child", "mesh": 0 },
                { "name": "Other", "mesh": 0 }
            ]),
            json!([{ "primitives": [primitive(0)] }]),
            json!([opaque_material("Body")]),
        )
        .with_roots(&[0, 2]);
        let model = import("gltf-hierarchy", &fixture);

        assert_eq!(model.root.children.len(), 2);
        let parent = &model.root.children[0];
        assert_eq!(parent.name, "Parent");
        assert_eq!(parent.children[0].name, "Child");
        // both nodes point at the same converted geometry
        assert_eq!(model.meshes.len(), 1);
        assert_eq!(model.mesh_count(), 2);
    }

    #[test]
    fn missing_normals_are_generated() {
        let model = import("gltf-normals", &TriangleFixture::single("Body"));
        let mesh = &model.meshes[0];
        assert_eq!(mesh.normals.len(), 3);
        assert_eq!(mesh.normals[0], [0.0, 0.0, 1.0]);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
    }
}
