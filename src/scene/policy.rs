use super::{MaterialId, MaterialKey, MaterialLibrary, MeshNode, NodeVisitor};
use crate::render::CubeMap;
use std::collections::HashSet;
use std::sync::Arc;

/// One-time post-load pass: every mesh casts and receives shadows, and the
/// reserved material is forced into alpha blending.
pub struct MaterialPolicy {
    transparent: MaterialKey,
    overridden: HashSet<MaterialId>,
    shadowed_meshes: usize,
}

impl MaterialPolicy {
    pub fn new(transparent: MaterialKey) -> Self {
        Self {
            transparent,
            overridden: HashSet::new(),
            shadowed_meshes: 0,
        }
    }

    pub fn shadowed_meshes(&self) -> usize {
        self.shadowed_meshes
    }

    pub fn overridden_materials(&self) -> usize {
        self.overridden.len()
    }
}

impl NodeVisitor for MaterialPolicy {
    fn visit_mesh(&mut self, name: &str, mesh: &mut MeshNode, materials: &mut MaterialLibrary) {
        mesh.cast_shadow = true;
        mesh.receive_shadow = true;
        self.shadowed_meshes += 1;

        let Some(material) = materials.get_mut(mesh.material) else {
            log::warn!("Mesh '{}' references missing material {:?}", name, mesh.material);
            return;
        };
        if material.key == self.transparent {
            material.transparent = true;
            if self.overridden.insert(mesh.material) {
                log::info!(
                    "Material '{}' found on mesh '{}', blending enabled",
                    material.key.as_str(),
                    name
                );
            }
        }
    }
}

/// Gives every mesh material the baked cube map as its reflectance source.
/// Materials shared by several meshes are assigned once.
pub struct EnvironmentAssignment {
    cube_map: Arc<CubeMap>,
    assigned: HashSet<MaterialId>,
}

impl EnvironmentAssignment {
    pub fn new(cube_map: Arc<CubeMap>) -> Self {
        Self {
            cube_map,
            assigned: HashSet::new(),
        }
    }

    pub fn assigned(&self) -> usize {
        self.assigned.len()
    }
}

impl NodeVisitor for EnvironmentAssignment {
    fn visit_mesh(&mut self, _name: &str, mesh: &mut MeshNode, materials: &mut MaterialLibrary) {
        if !self.assigned.insert(mesh.material) {
            return;
        }
        if let Some(material) = materials.get_mut(mesh.material) {
            material.assign_environment(Arc::clone(&self.cube_map));
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::render::testing::{solid_cube_map, test_model};
    use crate::scene::{DirectionalLight, Light, MaterialId, MaterialKey, NodeKind, SceneBuilder};
    use crate::settings::ViewerSettings;
    use glam::{Mat4, Vec3};
    use std::sync::Arc;

    #[test]
    fn every_mesh_casts_and_receives_shadows() {
        let scene = SceneBuilder::new(
            test_model(&["Body", "LensesMat", "Frame"]),
            1.0,
            MaterialKey::new("LensesMat"),
        )
        .finish(solid_cube_map(4));
        let mut count = 0;
        scene.walk_meshes(|_, mesh| {
            assert!(mesh.cast_shadow);
            assert!(mesh.receive_shadow);
            count += 1;
        });
        assert_eq!(count, 3);
    }

    #[test]
    fn only_the_reserved_material_is_forced_transparent() {
        let mut model = test_model(&["Body", "LensesMat", "Glass"]);
        // Loader default for "Glass" is already blended and must survive.
        for index in 0..model.materials.len() {
            let material = model.materials.get_mut(MaterialId(index)).unwrap();
            material.transparent = material.key.as_str() == "Glass";
        }

        let scene = SceneBuilder::new(model, 1.0, MaterialKey::new("LensesMat"))
            .finish(solid_cube_map(4));
        let flags: Vec<(String, bool)> = scene
            .materials()
            .iter()
            .map(|m| (m.key.as_str().to_string(), m.transparent))
            .collect();
        assert_eq!(
            flags,
            vec![
                ("Body".to_string(), false),
                ("LensesMat".to_string(), true),
                ("Glass".to_string(), true),
            ]
        );
    }

    #[test]
    fn material_match_is_exact() {
        let scene = SceneBuilder::new(
            test_model(&["lensesmat", "LensesMat2"]),
            1.0,
            MaterialKey::new("LensesMat"),
        )
        .finish(solid_cube_map(4));
        assert!(scene.materials().iter().all(|m| !m.transparent));
    }

    #[test]
    fn builder_holds_no_environment_until_finish() {
        let settings = ViewerSettings::default();
        let key = DirectionalLight::key(&settings.key_light, Vec3::ZERO);
        let builder = SceneBuilder::new(
            test_model(&["Body", "LensesMat"]),
            1.0,
            MaterialKey::new("LensesMat"),
        )
        .with_light("key light", Light::Directional(key));
        assert_eq!(builder.model.materials.len(), 2);
        assert!(builder.model.materials.iter().all(|m| m.environment().is_none()));

        let cube = solid_cube_map(4);
        let scene = builder.finish(Arc::clone(&cube));
        for material in scene.materials().iter() {
            let env = material.environment().expect("environment assigned");
            assert!(Arc::ptr_eq(env, &cube));
        }
    }

    #[test]
    fn shared_material_receives_environment_once() {
        let mut model = test_model(&["Shared"]);
        // Second mesh pointing at the same material.
        let first = model.root.children[0].clone();
        model.root.children.push(first);
        let cube = solid_cube_map(4);

        let scene =
            SceneBuilder::new(model, 1.0, MaterialKey::new("LensesMat")).finish(Arc::clone(&cube));
        assert_eq!(scene.materials().len(), 1);
        let material = scene.materials().iter().next().unwrap();
        assert!(Arc::ptr_eq(material.environment().unwrap(), &cube));
        // test handle, background, environment and the single material
        assert_eq!(Arc::strong_count(&cube), 4);
    }

    #[test]
    fn every_scene_material_references_the_baked_cube_map() {
        let cube = solid_cube_map(4);
        let scene = SceneBuilder::new(
            test_model(&["Body", "LensesMat", "Frame"]),
            1.0,
            MaterialKey::new("LensesMat"),
        )
        .finish(Arc::clone(&cube));
        for material in scene.materials().iter() {
            let env = material.environment().expect("environment assigned");
            assert!(Arc::ptr_eq(env, scene.background()));
        }
        let mut lights = 0;
        scene.root().walk(Mat4::IDENTITY, &mut |_, node| {
            if matches!(node.kind, NodeKind::Light(_)) {
                lights += 1;
            }
        });
        assert_eq!(lights, 0);
    }
}
