// renderer/defines.rs
// Builds the newline-separated define block that identifies a program
// variant. Identical inputs always produce byte-identical text.
use std::fmt::{self, Display, Write};

use super::light::{Light, LightType};
use super::material::{BillboardType, Material, RenderKind, TextureSlot};
use super::pass::PassType;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ShaderDefines {
    text: String,
}

/// Everything that picks a shader variant for one draw.
#[derive(Debug, Clone, Copy)]
pub struct DrawVariant<'a> {
    pub pass: PassType,
    pub material: &'a Material,
    pub light: Option<&'a Light>,
    pub instanced: bool,
    pub bones: usize,
}

impl ShaderDefines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, define: impl Display) {
        // Writing into a String cannot fail.
        let _ = writeln!(self.text, "{define}");
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines()
    }

    pub fn contains(&self, define: &str) -> bool {
        self.lines().any(|line| line == define)
    }

    pub fn for_draw(variant: DrawVariant<'_>) -> Self {
        let mut defines = Self::new();
        let DrawVariant {
            pass,
            material,
            light,
            instanced,
            bones,
        } = variant;

        match pass {
            PassType::Shadow => {
                defines.add("SHADOW");
                // Cube faces store light distance, which needs the light.
                if light.is_some_and(|light| light.kind() == LightType::Point) {
                    defines.add("SHADOWCUBE");
                    defines.add("HAS_POINT_LIGHT");
                }
            }
            PassType::Default | PassType::Lit => {
                defines.add_render_kind(pass, material.render_kind());
                defines.add_texture_maps(pass, material);
            }
        }

        if pass == PassType::Lit {
            if let Some(light) = light {
                defines.add_light(light, material.receives_shadows());
            }
        }

        if instanced {
            defines.add("INSTANCED");
        }

        match material.billboard() {
            BillboardType::None => {}
            BillboardType::Spherical => defines.add("SPHERICAL_BILLBOARD"),
            BillboardType::Cylindrical => defines.add("CYLINDRICAL_BILLBOARD"),
            BillboardType::CylindricalZ => defines.add("CYLINDRICAL_Z_BILLBOARD"),
        }

        if material.flip_y() {
            defines.add("FLIP_Y");
        }

        if bones > 0 {
            defines.add(format_args!("MAX_BONES {bones}"));
        }

        defines
    }

    fn add_render_kind(&mut self, pass: PassType, kind: RenderKind) {
        match kind {
            RenderKind::VertexColor => self.add("VERTEXCOLOR"),
            RenderKind::Unlit => self.add("UNLIT"),
            RenderKind::Text => self.add("TEXT"),
            RenderKind::ShowTexture0 => self.add("SHOW_TEXTURE0"),
            RenderKind::Lit if pass == PassType::Lit => self.add("LIT"),
            RenderKind::Lit => self.add("AMBIENT"),
        }
    }

    fn add_texture_maps(&mut self, pass: PassType, material: &Material) {
        for (slot, texture) in material.textures() {
            let uv = texture.uv_channel;
            match (slot, pass) {
                (TextureSlot::Diffuse, _) => {
                    self.add(format_args!("DIFFUSEMAP{uv}"));
                    if texture.use_alpha {
                        self.add("USEALPHA");
                    }
                }
                (TextureSlot::Normal, PassType::Lit) => self.add(format_args!("NORMALMAP{uv}")),
                (TextureSlot::Specular, PassType::Lit) => {
                    self.add(format_args!("SPECULARMAP{uv}"));
                    self.add(format_args!("SPECULARMAP_CHANNELS{}", texture.channels));
                }
                (TextureSlot::LightMap, PassType::Default) => {
                    self.add(format_args!("LIGHTMAP{uv}"));
                    self.add(format_args!("LIGHTMAP_CHANNELS{}", texture.channels));
                }
                (TextureSlot::AmbientOcclusion, PassType::Default) => {
                    self.add(format_args!("AOMAP{uv}"));
                    self.add(format_args!("AOMAP_CHANNELS{}", texture.channels));
                }
                _ => {}
            }
        }
    }

    fn add_light(&mut self, light: &Light, receive_shadows: bool) {
        let shadowed = light.casts_shadows() && receive_shadows;
        match light.kind() {
            LightType::Point => {
                self.add("HAS_POINT_LIGHT");
                if shadowed {
                    self.add("CUBESHADOWMAP");
                }
            }
            LightType::Directional => {
                self.add("HAS_DIRECTIONAL_LIGHT");
                if shadowed {
                    self.add("SHADOWMAP");
                }
            }
            LightType::Spot => {
                self.add("HAS_SPOT_LIGHT");
                if shadowed {
                    self.add("SHADOWMAP");
                }
            }
        }
    }
}

impl Display for ShaderDefines {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::asset::Handle;
    use crate::renderer::material::MaterialTexture;

    fn variant(pass: PassType, material: &Material) -> DrawVariant<'_> {
        DrawVariant {
            pass,
            material,
            light: None,
            instanced: false,
            bones: 0,
        }
    }

    #[test]
    fn identical_inputs_give_identical_text() {
        let a = Material::new("a");
        let b = Material::new("b");
        assert_eq!(
            ShaderDefines::for_draw(variant(PassType::Default, &a)),
            ShaderDefines::for_draw(variant(PassType::Default, &b))
        );
    }

    #[test]
    fn lit_material_is_ambient_then_lit() {
        let material = Material::lit("m");
        let ambient = ShaderDefines::for_draw(variant(PassType::Default, &material));
        assert_eq!(ambient.as_str(), "AMBIENT\n");

        let light = Light::directional(Vec3::NEG_Y).with_shadows();
        let lit = ShaderDefines::for_draw(DrawVariant {
            light: Some(&light),
            ..variant(PassType::Lit, &material)
        });
        assert_eq!(lit.as_str(), "LIT\nHAS_DIRECTIONAL_LIGHT\nSHADOWMAP\n");
    }

    #[test]
    fn shadow_define_needs_receiving_material() {
        let material = Material::lit("m").without_shadows();
        let light = Light::point(Vec3::ZERO, 3.0).with_shadows();
        let lit = ShaderDefines::for_draw(DrawVariant {
            light: Some(&light),
            ..variant(PassType::Lit, &material)
        });
        assert!(lit.contains("HAS_POINT_LIGHT"));
        assert!(!lit.contains("CUBESHADOWMAP"));
    }

    #[test]
    fn texture_maps_follow_pass() {
        let t = Handle::new(0);
        let material = Material::new("m")
            .with_texture(TextureSlot::Diffuse, MaterialTexture::new(t).with_alpha())
            .with_texture(TextureSlot::Normal, MaterialTexture::new(t).with_uv_channel(1))
            .with_texture(TextureSlot::LightMap, MaterialTexture::new(t).with_channels(1));

        let ambient = ShaderDefines::for_draw(variant(PassType::Default, &material));
        assert_eq!(
            ambient.as_str(),
            "AMBIENT\nDIFFUSEMAP0\nUSEALPHA\nLIGHTMAP0\nLIGHTMAP_CHANNELS1\n"
        );

        let lit = ShaderDefines::for_draw(variant(PassType::Lit, &material));
        assert!(lit.contains("NORMALMAP1"));
        assert!(!lit.contains("LIGHTMAP0"));
    }

    #[test]
    fn trailing_defines_keep_order() {
        let material = Material::unlit("m", glam::Vec4::ONE)
            .with_billboard(BillboardType::Cylindrical)
            .with_flip_y();
        let defines = ShaderDefines::for_draw(DrawVariant {
            instanced: true,
            bones: 24,
            ..variant(PassType::Default, &material)
        });
        assert_eq!(
            defines.as_str(),
            "UNLIT\nINSTANCED\nCYLINDRICAL_BILLBOARD\nFLIP_Y\nMAX_BONES 24\n"
        );
    }

    #[test]
    fn shadow_pass_ignores_material_kind() {
        let material = Material::lit("m");
        let defines = ShaderDefines::for_draw(variant(PassType::Shadow, &material));
        assert_eq!(defines.as_str(), "SHADOW\n");
    }

    #[test]
    fn only_point_light_shadow_pass_writes_distance() {
        let material = Material::lit("m");
        let point = Light::point(Vec3::ZERO, 4.0).with_shadows();
        let sun = Light::directional(Vec3::NEG_Y).with_shadows();
        let cube = ShaderDefines::for_draw(DrawVariant {
            light: Some(&point),
            ..variant(PassType::Shadow, &material)
        });
        assert_eq!(cube.as_str(), "SHADOW\nSHADOWCUBE\nHAS_POINT_LIGHT\n");
        let flat = ShaderDefines::for_draw(DrawVariant {
            light: Some(&sun),
            ..variant(PassType::Shadow, &material)
        });
        assert_eq!(flat.as_str(), "SHADOW\n");
    }
}
