//! Classification of declarations into chunk kinds.

use std::collections::HashSet;

use super::extractor::{DeclKind, Declaration};
use super::{ChunkKind, Role};

/// APIs whose use marks a hook or component as stateful.
pub const STATEFUL_APIS: &[&str] = &[
    "useState",
    "useReducer",
    "useForm",
    "useFormContext",
    "useFormState",
    "useController",
    "useWatch",
    "useFieldArray",
    "useActionState",
    "useRecordContext",
    "useListContext",
    "useGetList",
    "useGetOne",
    "useQuery",
    "useMutation",
    "useStore",
];

/// Kind and optional role assigned to a declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub kind: ChunkKind,
    pub role: Option<Role>,
}

/// Strategy mapping a declaration to a chunk kind.
pub trait Classifier: Send + Sync {
    fn classify(&self, decl: &Declaration, file_path: &str) -> Classification;
}

/// `use` followed by an uppercase letter, e.g. `useContacts`.
pub fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .map(|c| c.is_ascii_uppercase())
        .unwrap_or(false)
}

/// PascalCase names, excluding hooks.
pub fn is_component_name(name: &str) -> bool {
    name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false) && !is_hook_name(name)
}

/// Name-based classifier with a state-binding API allow-list.
#[derive(Debug, Clone)]
pub struct NamingClassifier {
    stateful_apis: HashSet<String>,
}

impl NamingClassifier {
    pub fn new<I, S>(stateful_apis: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stateful_apis: stateful_apis.into_iter().map(Into::into).collect(),
        }
    }

    fn role(&self, decl: &Declaration) -> Role {
        if decl.calls.iter().any(|c| self.stateful_apis.contains(c)) {
            Role::Stateful
        } else {
            Role::Presentational
        }
    }
}

impl Default for NamingClassifier {
    fn default() -> Self {
        Self::new(STATEFUL_APIS.iter().copied())
    }
}

impl Classifier for NamingClassifier {
    fn classify(&self, decl: &Declaration, _file_path: &str) -> Classification {
        let kind = match decl.decl {
            DeclKind::Class => ChunkKind::Class,
            DeclKind::Interface => ChunkKind::Interface,
            DeclKind::TypeAlias => ChunkKind::Type,
            DeclKind::Enum => ChunkKind::Unknown,
            DeclKind::Function if is_hook_name(&decl.name) => ChunkKind::Hook,
            DeclKind::Function if is_component_name(&decl.name) && decl.renders_jsx => {
                ChunkKind::Component
            }
            DeclKind::Function => ChunkKind::Function,
        };

        let role = match kind {
            ChunkKind::Hook | ChunkKind::Component => Some(self.role(decl)),
            _ => None,
        };

        Classification { kind, role }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn decl(name: &str, kind: DeclKind, jsx: bool, calls: &[&str]) -> Declaration {
        Declaration {
            name: name.to_string(),
            decl: kind,
            start_line: 1,
            end_line: 3,
            content: String::new(),
            exported: true,
            renders_jsx: jsx,
            calls: calls.iter().map(|c| c.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn test_hook_names() {
        assert!(is_hook_name("useContacts"));
        assert!(is_hook_name("useX"));
        assert!(!is_hook_name("use"));
        assert!(!is_hook_name("user"));
        assert!(!is_hook_name("useless"));
        assert!(!is_hook_name("UseThing"));
    }

    #[test]
    fn test_component_names() {
        assert!(is_component_name("ContactList"));
        assert!(!is_component_name("contactList"));
        assert!(!is_component_name(""));
    }

    #[test]
    fn test_classifies_hooks_by_role() {
        let classifier = NamingClassifier::default();

        let hook = decl("useFilters", DeclKind::Function, false, &["useState"]);
        let stateful = classifier.classify(&hook, "a.ts");
        assert_eq!(stateful.kind, ChunkKind::Hook);
        assert_eq!(stateful.role, Some(Role::Stateful));

        let hook = decl("useLabel", DeclKind::Function, false, &["format"]);
        let derived = classifier.classify(&hook, "a.ts");
        assert_eq!(derived.kind, ChunkKind::Hook);
        assert_eq!(derived.role, Some(Role::Presentational));
    }

    #[test]
    fn test_component_requires_jsx() {
        let classifier = NamingClassifier::default();

        let card = decl("ContactCard", DeclKind::Function, true, &[]);
        let component = classifier.classify(&card, "a.tsx");
        assert_eq!(component.kind, ChunkKind::Component);
        assert_eq!(component.role, Some(Role::Presentational));

        let store = decl("CreateStore", DeclKind::Function, false, &[]);
        let factory = classifier.classify(&store, "a.ts");
        assert_eq!(factory.kind, ChunkKind::Function);
        assert_eq!(factory.role, None);
    }

    #[test]
    fn test_custom_allow_list() {
        let classifier = NamingClassifier::new(["useSignal"]);
        let counter = decl("Counter", DeclKind::Function, true, &["useSignal"]);
        let result = classifier.classify(&counter, "a.tsx");
        assert_eq!(result.role, Some(Role::Stateful));
    }

    #[test]
    fn test_type_level_declarations() {
        let classifier = NamingClassifier::default();
        let kind_of = |name: &str, decl_kind: DeclKind| {
            classifier.classify(&decl(name, decl_kind, false, &[]), "a.ts").kind
        };
        assert_eq!(kind_of("Deal", DeclKind::Interface), ChunkKind::Interface);
        assert_eq!(kind_of("DealId", DeclKind::TypeAlias), ChunkKind::Type);
        assert_eq!(kind_of("Stage", DeclKind::Enum), ChunkKind::Unknown);
        assert_eq!(kind_of("Store", DeclKind::Class), ChunkKind::Class);
    }
}
