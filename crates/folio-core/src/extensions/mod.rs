// SPDX-License-Identifier: AGPL-3.0-or-later
//! Extension modules and their registry

pub mod diagram_code;
pub mod external_diagram;
pub mod flowchart;
pub mod placeholder;

pub use diagram_code::{DiagramCodeModule, DEFAULT_DIAGRAM_SOURCE, DIAGRAM_CODE_TYPE};
pub use external_diagram::{ExternalDiagramModule, EXTERNAL_DIAGRAM_TYPE};
pub use flowchart::{DiagramArtifact, DiagramRenderer, FlowchartError, FlowchartRenderer};
pub use placeholder::{PlaceholderModule, PLACEHOLDER_TYPE};

use crate::schema::{Schema, SchemaError};
use crate::traits::{EditingBehavior, ExtensionModule};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Schema plus the extension modules registered on it
#[derive(Clone)]
pub struct ExtensionRegistry {
    schema: Schema,
    modules: Vec<Arc<dyn ExtensionModule>>,
    index: HashMap<String, usize>,
}

impl ExtensionRegistry {
    /// Registry over `schema` with no modules
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            modules: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Basic schema with the diagram-as-code, external diagram and
    /// placeholder modules
    pub fn standard() -> Self {
        let mut registry = Self::new(Schema::basic());
        let modules: [Arc<dyn ExtensionModule>; 3] = [
            Arc::new(DiagramCodeModule::default()),
            Arc::new(ExternalDiagramModule),
            Arc::new(PlaceholderModule),
        ];
        for module in modules {
            registry
                .register(module)
                .expect("built-in extensions register cleanly");
        }
        registry
    }

    /// Register a module's node types and codec
    pub fn register(&mut self, module: Arc<dyn ExtensionModule>) -> Result<(), SchemaError> {
        for spec in module.node_specs() {
            self.schema.register_type(spec)?;
        }
        if let Some(label_attr) = module.fallback_label_attr() {
            self.schema.set_fallback(module.name(), label_attr)?;
        }
        tracing::debug!(module = module.name(), behavior = ?module.behavior(), "registered extension");
        self.index.insert(module.name().to_string(), self.modules.len());
        self.modules.push(module);
        Ok(())
    }

    pub fn module(&self, node_type: &str) -> Option<&dyn ExtensionModule> {
        self.index.get(node_type).map(|&i| self.modules[i].as_ref())
    }

    pub fn behavior(&self, node_type: &str) -> Option<EditingBehavior> {
        self.module(node_type).map(ExtensionModule::behavior)
    }

    pub fn modules(&self) -> impl Iterator<Item = &dyn ExtensionModule> {
        self.modules.iter().map(|m| m.as_ref())
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_schema(self) -> Schema {
        self.schema
    }
}

impl Default for ExtensionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Schema {
    /// Basic schema plus the standard extension node types
    pub fn standard() -> Self {
        ExtensionRegistry::standard().into_schema()
    }
}
