use std::collections::{HashMap, HashSet};

use pagemap_domain::ax::{AxTreeSource, RawAxNode};
use pagemap_domain::model::{Affordance, Interactable, Region, Tier};

const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "searchbox",
    "textbox",
    "combobox",
    "listbox",
    "checkbox",
    "radio",
    "tab",
    "menuitem",
    "switch",
    "slider",
    "spinbutton",
];

const LANDMARK_ROLES: &[&str] = &[
    "banner",
    "main",
    "contentinfo",
    "navigation",
    "complementary",
    "region",
];

/// Total map, every interactive role → affordance. Missing an entry here
/// for a role in `INTERACTIVE_ROLES` is a programming error, enforced by
/// the `debug_assert!` in `affordance_for`.
fn affordance_for(role: &str) -> Affordance {
    match role {
        "button" | "link" | "checkbox" | "radio" | "tab" | "menuitem" | "switch" => Affordance::Click,
        "searchbox" | "textbox" => Affordance::Type,
        "combobox" | "listbox" => Affordance::Select,
        // Sliders and spin buttons expose their value as typed text in
        // every AX-tree-driven automation surface we've seen; there is no
        // dedicated "drag" affordance in VALID_ACTIONS.
        "slider" | "spinbutton" => Affordance::Type,
        other => {
            debug_assert!(false, "no affordance mapping for interactive role {other}");
            Affordance::Click
        }
    }
}

fn region_for_landmark(role: &str) -> Option<Region> {
    match role {
        "banner" => Some(Region::Header),
        "main" => Some(Region::Main),
        "contentinfo" => Some(Region::Footer),
        "navigation" => Some(Region::Navigation),
        "complementary" => Some(Region::Complementary),
        "region" => Some(Region::Main),
        _ => None,
    }
}

struct Walker<'a> {
    nodes: &'a HashMap<&'a str, &'a RawAxNode>,
    ref_counter: u32,
    seen_named: HashSet<(String, String)>,
    out: Vec<Interactable>,
}

impl<'a> Walker<'a> {
    fn walk(&mut self, node_id: &str, region: Region) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        if node.ignored {
            for child in &node.child_ids {
                self.walk(child, region);
            }
            return;
        }

        let next_region = region_for_landmark(&node.role).unwrap_or(region);

        if INTERACTIVE_ROLES.contains(&node.role.as_str()) {
            self.ref_counter += 1;
            let r#ref = self.ref_counter;
            let name = node.name.trim().to_string();
            let tier = if name.is_empty() { Tier::Unnamed } else { Tier::Named };

            let dedup_key = (node.role.clone(), name.clone());
            let is_duplicate = !name.is_empty() && self.seen_named.contains(&dedup_key);

            let options = if matches!(node.role.as_str(), "combobox" | "listbox") {
                self.collect_options(node_id)
            } else {
                Vec::new()
            };

            if !is_duplicate {
                if !name.is_empty() {
                    self.seen_named.insert(dedup_key);
                }
                self.out.push(Interactable {
                    r#ref,
                    role: node.role.clone(),
                    name,
                    affordance: affordance_for(&node.role),
                    region: next_region,
                    tier,
                    value: node.value.clone(),
                    options,
                    selector: None,
                });
            } else {
                // Duplicate named node: don't keep it, but the ref counter
                // still advanced, matching "numbering is sequential across
                // all nodes" — refs are not reused or compacted.
            }
        }

        for child in &node.child_ids {
            self.walk(child, next_region);
        }
    }

    /// Walk children/descendants through `group` nodes collecting `option`
    /// accessible names in order, per §4.7.
    fn collect_options(&self, node_id: &str) -> Vec<String> {
        let mut options = Vec::new();
        self.collect_options_inner(node_id, &mut options);
        options
    }

    fn collect_options_inner(&self, node_id: &str, out: &mut Vec<String>) {
        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        for child_id in &node.child_ids {
            let Some(child) = self.nodes.get(child_id.as_str()) else {
                continue;
            };
            match child.role.as_str() {
                "option" => out.push(child.name.trim().to_string()),
                "group" => self.collect_options_inner(child_id, out),
                _ => {}
            }
        }
    }
}

/// Fetch and walk the page's accessibility tree, returning the detected
/// interactables and any non-fatal warnings. Never panics: any failure
/// reaching into the AX subsystem is caught here (level 1 isolation) and
/// turned into an empty result with a warning string.
pub async fn detect_interactables(source: &dyn AxTreeSource) -> (Vec<Interactable>, Vec<String>) {
    let nodes = match source.fetch_ax_tree().await {
        Ok(nodes) => nodes,
        Err(e) => {
            return (
                Vec::new(),
                vec![format!("AX tree detection failed ({}): {}", error_kind(&e), e)],
            );
        }
    };

    if nodes.is_empty() {
        return (Vec::new(), Vec::new());
    }

    let by_id: HashMap<&str, &RawAxNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    let referenced: HashSet<&str> = nodes.iter().flat_map(|n| n.child_ids.iter().map(String::as_str)).collect();
    let Some(root) = nodes.iter().find(|n| !referenced.contains(n.id.as_str())).or_else(|| nodes.first()) else {
        return (Vec::new(), Vec::new());
    };

    let mut walker = Walker {
        nodes: &by_id,
        ref_counter: 0,
        seen_named: HashSet::new(),
        out: Vec::new(),
    };
    walker.walk(&root.id, Region::Main);

    (walker.out, Vec::new())
}

fn error_kind(e: &pagemap_domain::Error) -> &'static str {
    match e {
        pagemap_domain::Error::BrowserDead(_) => "BrowserDead",
        pagemap_domain::Error::Timeout { .. } => "Timeout",
        _ => "Error",
    }
}
