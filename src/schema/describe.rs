use std::fmt::Write;

use super::{Presence, Rule, Schema, TypeId, TypeKind};

impl Schema {
    /// Human-readable structural summary of type `id`.
    ///
    /// Depends only on the schema: fields appear in declaration order and a
    /// type already being described further up the tree is printed as
    /// `@<pointer>` instead of being expanded again.
    pub fn describe(&self, id: TypeId) -> String {
        let mut out = String::new();
        self.describe_into(id, &mut Vec::new(), &mut out);
        out
    }

    fn describe_into(&self, id: TypeId, stack: &mut Vec<TypeId>, out: &mut String) {
        let id = self.resolve(id);
        if stack.contains(&id) {
            out.push('@');
            out.push_str(&self.descriptor(id).pointer);
            return;
        }
        match &self.descriptor(id).kind {
            TypeKind::String => out.push_str("string"),
            TypeKind::Boolean => out.push_str("boolean"),
            TypeKind::Any { .. } => out.push_str("any"),
            TypeKind::Number(refinements) => {
                out.push_str("number");
                if !refinements.is_empty() {
                    let rules: Vec<String> = refinements
                        .iter()
                        .map(|r| match r.rule {
                            Rule::AtLeast(min) => format!(">= {min}"),
                            Rule::AtMost(max) => format!("<= {max}"),
                        })
                        .collect();
                    let _ = write!(out, " ({})", rules.join(", "));
                }
            }
            TypeKind::Array { items } => {
                stack.push(id);
                let nullable = matches!(self.descriptor(*items).presence, Presence::Optional);
                if nullable {
                    out.push('(');
                }
                self.describe_into(*items, stack, out);
                if nullable {
                    out.push_str(" | null)");
                }
                out.push_str("[]");
                stack.pop();
            }
            TypeKind::Object(object) => {
                if object.fields.is_empty() && object.computed.is_empty() {
                    out.push_str("{}");
                    return;
                }
                stack.push(id);
                let mut parts = Vec::new();
                for (name, field) in &object.fields {
                    let mut part = String::new();
                    let presence = &self.descriptor(*field).presence;
                    part.push_str(name);
                    if matches!(presence, Presence::Optional) {
                        part.push('?');
                    }
                    part.push_str(": ");
                    self.describe_into(*field, stack, &mut part);
                    if let Presence::Defaulted(default) = presence {
                        let _ = write!(part, " = {default}");
                    }
                    parts.push(part);
                }
                for (name, computed) in &object.computed {
                    parts.push(format!("{name}: computed({})", computed.expression));
                }
                let _ = write!(out, "{{ {} }}", parts.join("; "));
                stack.pop();
            }
            // resolve() never stops on a reference
            TypeKind::Ref(_) => out.push_str("any"),
        }
    }
}
