// Endpoint compiler: raw declarations in, fully resolved tree out
//
// Auth and CORS inherit parent -> child. Handlers never inherit. Within a
// node, later resolution steps overwrite earlier ones:
// inherited < common < read/write < per-method.

pub mod auth_table;
pub mod cors;

use serde_json::Value;
use thiserror::Error;

use crate::model::decl::{join_path, AuthDecl, AuthShortcut, DeclError, HandlerShortcut, RequirementDecl};
use crate::model::{AuthMethod, EndpointDecl, HttpMethod};
use crate::pipeline::HandlerRef;
use crate::realtime::RealtimeHandlerRef;
use crate::registry::Registry;

pub use auth_table::{AuthEntry, AuthTable, Requirement};
pub use cors::{CorsOptions, CorsOrigin};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Declaration(#[from] DeclError),

    #[error("endpoint '{path}': unknown {kind} '{name}'")]
    UnknownHandler { path: String, kind: &'static str, name: String },

    #[error("endpoint '{path}': unknown policy '{name}'")]
    UnknownPolicy { path: String, name: String },

    #[error("endpoint '{path}': unknown real-time handler '{name}'")]
    UnknownRealtimeHandler { path: String, name: String },
}

/// Per-method handler and filter lists
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MethodHandlers {
    handlers: [Vec<HandlerRef>; 7],
    filters: [Vec<HandlerRef>; 7],
}

impl MethodHandlers {
    pub fn handlers(&self, method: HttpMethod) -> &[HandlerRef] {
        &self.handlers[method.index()]
    }

    pub fn filters(&self, method: HttpMethod) -> &[HandlerRef] {
        &self.filters[method.index()]
    }

    /// A method gets a route when it has anything to run
    pub fn is_registered(&self, method: HttpMethod) -> bool {
        !self.handlers(method).is_empty() || !self.filters(method).is_empty()
    }

    pub fn registered_methods(&self) -> Vec<HttpMethod> {
        HttpMethod::ALL
            .into_iter()
            .filter(|method| self.is_registered(*method))
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RealtimeHandlers {
    pub connect: Vec<RealtimeHandlerRef>,
    pub message: Vec<RealtimeHandlerRef>,
    pub disconnect: Vec<RealtimeHandlerRef>,
}

impl RealtimeHandlers {
    pub fn is_empty(&self) -> bool {
        self.connect.is_empty() && self.message.is_empty() && self.disconnect.is_empty()
    }
}

/// A fully resolved endpoint. Immutable after compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledNode {
    /// Key under the parent (`""` for the root)
    pub key: String,
    /// Full route pattern, e.g. `/todos/:id`
    pub path: String,
    pub auth: AuthTable,
    /// Field-level tables, inheriting from this node's own table
    pub fields: Vec<(String, AuthTable)>,
    pub cors: CorsOptions,
    pub handlers: MethodHandlers,
    pub real_time: RealtimeHandlers,
    pub collection: Option<String>,
    pub children: Vec<CompiledNode>,
    /// True when this node or any descendant declares real-time handlers
    pub has_realtime: bool,
}

impl CompiledNode {
    pub fn child(&self, key: &str) -> Option<&CompiledNode> {
        self.children.iter().find(|child| child.key == key)
    }

    /// Depth-first, parent before children, children in declared order
    pub fn walk(&self) -> Vec<&CompiledNode> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.walk());
        }
        out
    }

    pub fn field(&self, name: &str) -> Option<&AuthTable> {
        self.fields.iter().find(|(field, _)| field == name).map(|(_, table)| table)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledModel {
    pub root: CompiledNode,
    /// Whether the real-time transport needs to be stood up at all
    pub has_realtime: bool,
}

impl CompiledModel {
    pub fn nodes(&self) -> Vec<&CompiledNode> {
        self.root.walk()
    }

    pub fn find(&self, path: &str) -> Option<&CompiledNode> {
        self.nodes().into_iter().find(|node| node.path == path)
    }
}

pub struct Compiler<'r> {
    registry: &'r Registry,
    default_cors: CorsOptions,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            default_cors: CorsOptions::default(),
        }
    }

    pub fn with_default_cors(mut self, cors: CorsOptions) -> Self {
        self.default_cors = cors;
        self
    }

    /// Parse and compile a merged raw tree
    pub fn compile_value(&self, raw: &Value) -> Result<CompiledModel, CompileError> {
        let decl = EndpointDecl::parse(raw, "/")?;
        self.compile_model(&decl)
    }

    pub fn compile_model(&self, decl: &EndpointDecl) -> Result<CompiledModel, CompileError> {
        let root = self.compile(decl, "", None)?;
        let has_realtime = root.has_realtime;

        tracing::info!(
            "Compiled endpoint model: {} nodes, real-time {}",
            root.walk().len(),
            if has_realtime { "enabled" } else { "disabled" }
        );

        Ok(CompiledModel { root, has_realtime })
    }

    /// Compile one node against its (already compiled) parent
    pub fn compile(
        &self,
        decl: &EndpointDecl,
        key: &str,
        parent: Option<&CompiledNode>,
    ) -> Result<CompiledNode, CompileError> {
        let path = match parent {
            Some(parent) => join_path(&parent.path, key),
            None => "/".to_string(),
        };

        let inherited = match parent {
            Some(parent) => parent.auth.clone(),
            None => AuthTable::root_default(),
        };
        let auth = self.resolve_auth(&decl.auth, inherited, &path)?;

        // Parent field tables carry over; a redeclared field is resolved again
        // against this node's table.
        let mut fields: Vec<(String, AuthTable)> = parent.map(|p| p.fields.clone()).unwrap_or_default();
        for (field, field_decl) in &decl.auth.fields {
            if !field_decl.fields.is_empty() {
                tracing::warn!("Endpoint '{}': nested fields under '{}' are ignored", path, field);
            }
            let table = self.resolve_auth(field_decl, auth.clone(), &path)?;
            match fields.iter_mut().find(|(name, _)| name == field) {
                Some(slot) => slot.1 = table,
                None => fields.push((field.clone(), table)),
            }
        }

        let inherited_cors = parent.map(|p| &p.cors).unwrap_or(&self.default_cors);
        let cors = match &decl.cors {
            Some(cors) => inherited_cors.merged_with(cors),
            None => inherited_cors.clone(),
        };

        let handlers = MethodHandlers {
            handlers: self.resolve_handlers(&decl.handlers, &path, "handler")?,
            filters: self.resolve_handlers(&decl.filters, &path, "filter")?,
        };

        let real_time = RealtimeHandlers {
            connect: self.resolve_realtime(&decl.real_time.connect, &path)?,
            message: self.resolve_realtime(&decl.real_time.message, &path)?,
            disconnect: self.resolve_realtime(&decl.real_time.disconnect, &path)?,
        };

        let collection = decl
            .collection
            .clone()
            .or_else(|| parent.and_then(|p| p.collection.clone()));

        let mut node = CompiledNode {
            key: key.to_string(),
            has_realtime: !real_time.is_empty(),
            path,
            auth,
            fields,
            cors,
            handlers,
            real_time,
            collection,
            children: Vec::new(),
        };

        let children = decl
            .children
            .iter()
            .map(|(child_key, child)| self.compile(child, child_key, Some(&node)))
            .collect::<Result<Vec<_>, _>>()?;

        node.has_realtime |= children.iter().any(|child| child.has_realtime);
        node.children = children;

        tracing::debug!(
            "Compiled endpoint '{}' (methods: {:?}, children: {})",
            node.path,
            node.handlers.registered_methods(),
            node.children.len()
        );

        Ok(node)
    }

    fn resolve_auth(&self, decl: &AuthDecl, inherited: AuthTable, path: &str) -> Result<AuthTable, CompileError> {
        let mut table = inherited;

        for shortcut in &decl.shortcuts {
            if let AuthShortcut::Common(requirement) = shortcut {
                table.apply(&AuthMethod::ALL, &self.requirement(requirement, path)?);
            }
        }
        for shortcut in &decl.shortcuts {
            if let AuthShortcut::Read(requirement) = shortcut {
                table.apply(&AuthMethod::READ, &self.requirement(requirement, path)?);
            }
        }
        for shortcut in &decl.shortcuts {
            if let AuthShortcut::Write(requirement) = shortcut {
                table.apply(&AuthMethod::WRITE, &self.requirement(requirement, path)?);
            }
        }
        for shortcut in &decl.shortcuts {
            if let AuthShortcut::Method(method, requirement) = shortcut {
                table.set(*method, self.requirement(requirement, path)?);
            }
        }

        Ok(table)
    }

    fn requirement(&self, decl: &RequirementDecl, path: &str) -> Result<AuthEntry, CompileError> {
        let entry = match decl {
            RequirementDecl::Deny => AuthEntry::Forbidden,
            RequirementDecl::Open => AuthEntry::Required(Requirement::open()),
            RequirementDecl::Rules {
                requires_auth,
                requires_roles,
                policies,
            } => {
                let mut requirement = Requirement::new(requires_auth.unwrap_or(true), requires_roles.clone());
                for name in policies {
                    let policy = self.registry.policy(name).ok_or_else(|| CompileError::UnknownPolicy {
                        path: path.to_string(),
                        name: name.clone(),
                    })?;
                    requirement = requirement.with_policy(policy);
                }
                AuthEntry::Required(requirement)
            }
            RequirementDecl::Malformed(reason) => {
                tracing::warn!("Endpoint '{}': malformed auth declaration ({}), denying access", path, reason);
                AuthEntry::Forbidden
            }
        };
        Ok(entry)
    }

    fn resolve_handlers(
        &self,
        shortcuts: &[HandlerShortcut],
        path: &str,
        kind: &'static str,
    ) -> Result<[Vec<HandlerRef>; 7], CompileError> {
        let mut lists: [Vec<HandlerRef>; 7] = Default::default();

        let mut assign = |methods: &[HttpMethod], names: &[String]| -> Result<(), CompileError> {
            let resolved = names
                .iter()
                .map(|name| {
                    self.registry
                        .handler(name)
                        .map(|handler| HandlerRef::new(name.clone(), handler))
                        .ok_or_else(|| CompileError::UnknownHandler {
                            path: path.to_string(),
                            kind,
                            name: name.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            for method in methods {
                lists[method.index()] = resolved.clone();
            }
            Ok(())
        };

        for shortcut in shortcuts {
            if let HandlerShortcut::Read(names) = shortcut {
                assign(&HttpMethod::READ, names)?;
            }
        }
        for shortcut in shortcuts {
            if let HandlerShortcut::Write(names) = shortcut {
                assign(&HttpMethod::WRITE, names)?;
            }
        }
        for shortcut in shortcuts {
            if let HandlerShortcut::Method(method, names) = shortcut {
                assign(&[*method], names)?;
            }
        }

        Ok(lists)
    }

    fn resolve_realtime(&self, names: &[String], path: &str) -> Result<Vec<RealtimeHandlerRef>, CompileError> {
        names
            .iter()
            .map(|name| {
                self.registry
                    .realtime(name)
                    .map(|handler| RealtimeHandlerRef::new(name.clone(), handler))
                    .ok_or_else(|| CompileError::UnknownRealtimeHandler {
                        path: path.to_string(),
                        name: name.clone(),
                    })
            })
            .collect()
    }
}
