pub mod lights;
mod policy;

pub use lights::{AmbientLight, DirectionalLight, Light};
pub use policy::{EnvironmentAssignment, MaterialPolicy};

use crate::render::CubeMap;
use glam::{Mat4, Vec3};
use image::RgbaImage;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub usize);

/// Stable identity used for content-specific material overrides.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MaterialKey(String);

impl MaterialKey {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone)]
pub struct Material {
    pub key: MaterialKey,
    pub base_color: [f32; 4],
    pub base_color_texture: Option<TextureId>,
    pub metallic: f32,
    pub roughness: f32,
    pub transparent: bool,
    environment: Option<Arc<CubeMap>>,
}

impl Material {
    pub fn new(key: MaterialKey) -> Self {
        Self {
            key,
            base_color: [1.0, 1.0, 1.0, 1.0],
            base_color_texture: None,
            metallic: 1.0,
            roughness: 1.0,
            transparent: false,
            environment: None,
        }
    }

    /// Reflectance source, present once the environment has been baked.
    pub fn environment(&self) -> Option<&Arc<CubeMap>> {
        self.environment.as_ref()
    }

    fn assign_environment(&mut self, cube_map: Arc<CubeMap>) {
        debug_assert!(
            self.environment.is_none(),
            "environment assigned twice to material {}",
            self.key.as_str()
        );
        self.environment = Some(cube_map);
    }
}

#[derive(Debug, Clone, Default)]
pub struct MaterialLibrary {
    materials: Vec<Material>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, material: Material) -> MaterialId {
        self.materials.push(material);
        MaterialId(self.materials.len() - 1)
    }

    pub fn get(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id.0)
    }

    pub fn get_mut(&mut self, id: MaterialId) -> Option<&mut Material> {
        self.materials.get_mut(id.0)
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Material> {
        self.materials.iter()
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }
}

/// Triangle-list geometry as it came out of the importer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<[f32; 3]>,
    pub normals: Vec<[f32; 3]>,
    pub uvs: Vec<[f32; 2]>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Fill in smooth vertex normals when the source had none.
    pub fn ensure_normals(&mut self) {
        if self.normals.len() == self.positions.len() {
            return;
        }
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for triangle in self.indices.chunks_exact(3) {
            let [a, b, c] = [triangle[0], triangle[1], triangle[2]].map(|i| i as usize);
            if a >= normals.len() || b >= normals.len() || c >= normals.len() {
                continue;
            }
            let pa = Vec3::from(self.positions[a]);
            let pb = Vec3::from(self.positions[b]);
            let pc = Vec3::from(self.positions[c]);
            let face = (pb - pa).cross(pc - pa);
            normals[a] += face;
            normals[b] += face;
            normals[c] += face;
        }
        self.normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
            .collect();
    }

    pub fn bounds_center(&self) -> Vec3 {
        if self.positions.is_empty() {
            return Vec3::ZERO;
        }
        let mut min = Vec3::splat(f32::MAX);
        let mut max = Vec3::splat(f32::MIN);
        for p in &self.positions {
            let p = Vec3::from(*p);
            min = min.min(p);
            max = max.max(p);
        }
        (min + max) * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshNode {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub cast_shadow: bool,
    pub receive_shadow: bool,
}

impl MeshNode {
    pub fn new(mesh: MeshId, material: MaterialId) -> Self {
        Self {
            mesh,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    Group,
    Mesh(MeshNode),
    Light(Light),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub name: String,
    pub transform: Mat4,
    pub kind: NodeKind,
    pub children: Vec<Node>,
}

impl Node {
    pub fn group(name: impl Into<String>) -> Self {
        Self::with_kind(name, NodeKind::Group)
    }

    pub fn mesh(name: impl Into<String>, mesh: MeshNode) -> Self {
        Self::with_kind(name, NodeKind::Mesh(mesh))
    }

    pub fn light(name: impl Into<String>, light: Light) -> Self {
        Self::with_kind(name, NodeKind::Light(light))
    }

    fn with_kind(name: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            kind,
            children: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: Node) -> Self {
        self.children.push(child);
        self
    }

    /// Depth-first mutable traversal dispatching on the node kind.
    pub fn accept<V: NodeVisitor + ?Sized>(
        &mut self,
        visitor: &mut V,
        materials: &mut MaterialLibrary,
    ) {
        match &mut self.kind {
            NodeKind::Group => visitor.visit_group(&self.name),
            NodeKind::Mesh(mesh) => visitor.visit_mesh(&self.name, mesh, materials),
            NodeKind::Light(light) => visitor.visit_light(&self.name, light),
        }
        for child in &mut self.children {
            child.accept(visitor, materials);
        }
    }

    /// Depth-first read-only walk with accumulated world transforms.
    pub fn walk<'a, F>(&'a self, parent: Mat4, f: &mut F)
    where
        F: FnMut(Mat4, &'a Node),
    {
        let world = parent * self.transform;
        f(world, self);
        for child in &self.children {
            child.walk(world, f);
        }
    }
}

/// Typed traversal over [`NodeKind`]; every hook defaults to a no-op.
pub trait NodeVisitor {
    fn visit_group(&mut self, _name: &str) {}

    fn visit_mesh(&mut self, _name: &str, _mesh: &mut MeshNode, _materials: &mut MaterialLibrary) {
    }

    fn visit_light(&mut self, _name: &str, _light: &mut Light) {}
}

/// A loaded model: node tree plus the geometry, materials and textures it references.
#[derive(Debug, Clone)]
pub struct Model {
    pub root: Node,
    pub meshes: Vec<MeshData>,
    pub materials: MaterialLibrary,
    pub textures: Vec<RgbaImage>,
}

impl Model {
    pub fn traverse_mut<V: NodeVisitor + ?Sized>(&mut self, visitor: &mut V) {
        self.root.accept(visitor, &mut self.materials);
    }

    pub fn mesh_count(&self) -> usize {
        let mut count = 0;
        self.root.walk(Mat4::IDENTITY, &mut |_, node| {
            if matches!(node.kind, NodeKind::Mesh(_)) {
                count += 1;
            }
        });
        count
    }
}

/// The single renderable scene. Only [`SceneBuilder::finish`] creates one, so
/// background and environment are always the baked cube map.
#[derive(Debug)]
pub struct Scene {
    root: Node,
    meshes: Vec<MeshData>,
    materials: MaterialLibrary,
    textures: Vec<RgbaImage>,
    background: Arc<CubeMap>,
    environment: Arc<CubeMap>,
}

impl Scene {
    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn meshes(&self) -> &[MeshData] {
        &self.meshes
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshData> {
        self.meshes.get(id.0)
    }

    pub fn materials(&self) -> &MaterialLibrary {
        &self.materials
    }

    pub fn textures(&self) -> &[RgbaImage] {
        &self.textures
    }

    pub fn background(&self) -> &Arc<CubeMap> {
        &self.background
    }

    pub fn environment(&self) -> &Arc<CubeMap> {
        &self.environment
    }

    /// Visit every mesh node with its world transform.
    pub fn walk_meshes<'a, F>(&'a self, mut f: F)
    where
        F: FnMut(Mat4, &'a MeshNode),
    {
        self.root.walk(Mat4::IDENTITY, &mut |world, node| {
            if let NodeKind::Mesh(mesh) = &node.kind {
                f(world, mesh);
            }
        });
    }

    pub fn directional_light(&self) -> Option<&DirectionalLight> {
        self.lights().find_map(|light| match light {
            Light::Directional(light) => Some(light),
            Light::Ambient(_) => None,
        })
    }

    pub fn ambient_light(&self) -> Option<&AmbientLight> {
        self.lights().find_map(|light| match light {
            Light::Ambient(light) => Some(light),
            Light::Directional(_) => None,
        })
    }

    fn lights(&self) -> impl Iterator<Item = &Light> {
        self.root.children.iter().filter_map(|node| match &node.kind {
            NodeKind::Light(light) => Some(light),
            _ => None,
        })
    }
}

/// Composes a loaded model, the fixed lights and the baked environment into a [`Scene`].
pub struct SceneBuilder {
    model: Model,
    lights: Vec<Node>,
}

impl SceneBuilder {
    /// Scales the model once and runs the shadow/transparency policy pass.
    pub fn new(mut model: Model, scale: f32, transparent_material: MaterialKey) -> Self {
        model.root.transform = Mat4::from_scale(Vec3::splat(scale)) * model.root.transform;

        let mut policy = MaterialPolicy::new(transparent_material);
        model.traverse_mut(&mut policy);
        log::info!(
            "Material pass: {} meshes shadowed, {} transparent override(s)",
            policy.shadowed_meshes(),
            policy.overridden_materials()
        );

        Self {
            model,
            lights: Vec::new(),
        }
    }

    pub fn with_light(mut self, name: &str, light: Light) -> Self {
        self.lights.push(Node::light(name, light));
        self
    }

    /// Assigns the cube map to every mesh material and installs it as background.
    pub fn finish(self, cube_map: Arc<CubeMap>) -> Scene {
        let Model {
            root: model_root,
            meshes,
            mut materials,
            textures,
        } = self.model;

        let mut root = Node::group("scene").with_child(model_root);
        root.children.extend(self.lights);

        let mut assignment = EnvironmentAssignment::new(Arc::clone(&cube_map));
        root.accept(&mut assignment, &mut materials);
        log::info!(
            "Environment assigned to {} material(s)",
            assignment.assigned()
        );

        Scene {
            root,
            meshes,
            materials,
            textures,
            background: Arc::clone(&cube_map),
            environment: cube_map,
        }
    }
}
