//! Shader Template Library
//!
//! WGSL sources are minijinja templates. A pass asks for a template name
//! plus a set of [`ShaderDefines`]; the library renders the final WGSL and
//! deduplicates compiled `wgpu::ShaderModule`s by hashing that source with
//! xxh3-128.
//!
//! Template syntax:
//!
//! | Construct            | Meaning                              |
//! |----------------------|--------------------------------------|
//! | `{$ if NAME $}`      | Block statement                      |
//! | `{{ value }}`        | Expression                           |
//! | `$$ if NAME`         | Line statement                       |
//! | `{$ include "x" $}`  | Includes `chunks/x.wgsl`             |
//!
//! Sources are looked up in the optional override directory first and then
//! in the set embedded at build time.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, Error, ErrorKind, Value};
use rust_embed::RustEmbed;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{Result, SheenError};
use crate::settings::FinalizeSettings;

#[derive(RustEmbed)]
#[folder = "src/pipeline/shaders"]
struct ShaderAssets;

/// Preprocessor-style values handed to a shader template.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderDefines(BTreeMap<String, Value>);

impl ShaderDefines {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a boolean flag, tested in templates with `{$ if NAME $}`.
    #[must_use]
    pub fn define(mut self, name: &str, enabled: bool) -> Self {
        self.0.insert(name.to_string(), Value::from(enabled));
        self
    }

    /// Sets an arbitrary template value.
    #[must_use]
    pub fn set(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.0.insert(name.to_string(), value.into());
        self
    }
}

fn shader_filename(name: &str) -> Cow<'_, str> {
    if Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"))
    {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.wgsl"))
    }
}

fn load_shader(root: Option<&Path>, name: &str) -> std::result::Result<Option<String>, Error> {
    let filename = shader_filename(name);

    if let Some(root) = root {
        let path = root.join(filename.as_ref());
        if path.exists() {
            return std::fs::read_to_string(&path).map(Some).map_err(|e| {
                Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("Failed to read {}: {e}", path.display()),
                )
            });
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

/// Template environment plus a compiled-module cache.
pub struct ShaderLibrary {
    env: Environment<'static>,
    /// xxh3-128 of final WGSL → compiled module.
    module_cache: FxHashMap<u128, wgpu::ShaderModule>,
}

impl ShaderLibrary {
    /// Creates a library that prefers sources under `root` when given.
    pub fn new(root: Option<PathBuf>) -> Result<Self> {
        let mut env = Environment::new();

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{$", "$}")
            .variable_delimiters("{{", "}}")
            .line_statement_prefix("$$")
            .build()?;

        env.set_syntax(syntax);
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        env.set_undefined_behavior(minijinja::UndefinedBehavior::SemiStrict);
        env.set_loader(move |name| load_shader(root.as_deref(), name));
        env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

        Ok(Self {
            env,
            module_cache: FxHashMap::default(),
        })
    }

    /// Creates a library that searches `settings.shader_root` first.
    pub fn from_settings(settings: &FinalizeSettings) -> Result<Self> {
        if let Some(root) = &settings.shader_root {
            log::info!("Loading shader overrides from {}", root.display());
        }
        Self::new(settings.shader_root.clone())
    }

    /// Renders `template` to final WGSL source.
    pub fn render(&self, template: &str, defines: &ShaderDefines) -> Result<String> {
        let tmpl = self.env.get_template(template).map_err(|e| {
            if e.kind() == ErrorKind::TemplateNotFound {
                SheenError::ShaderNotFound(template.to_string())
            } else {
                SheenError::from(e)
            }
        })?;
        Ok(tmpl.render(&defines.0)?)
    }

    /// Renders and compiles `template`, or returns the cached module for
    /// identical source.
    pub fn get_or_compile(
        &mut self,
        device: &wgpu::Device,
        template: &str,
        defines: &ShaderDefines,
    ) -> Result<&wgpu::ShaderModule> {
        let source = self.render(template, defines)?;
        let hash = xxh3_128(source.as_bytes());

        let module = self.module_cache.entry(hash).or_insert_with(|| {
            log::debug!("Compiling shader '{template}' ({hash:032x})");
            device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("Shader Module {template}")),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
        });
        Ok(module)
    }

    #[inline]
    #[must_use]
    pub fn cached_module_count(&self) -> usize {
        self.module_cache.len()
    }
}
