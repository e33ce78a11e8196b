//! Entity names accepted on the command line and their lookup rules

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
  Executors,
  Definitions,
  Runs,
  Suites,
}

#[derive(Debug, Clone)]
pub struct EntityName {
  pub kind: EntityKind,
  pub name: &'static str,
  pub aliases: &'static [&'static str],
  pub description: &'static str,
}

/// All addressable entity collections
pub const ENTITIES: &[EntityName] = &[
  EntityName {
    kind: EntityKind::Executors,
    name: "executors",
    aliases: &["x", "executor", "exec"],
    description: "Container images that run tests",
  },
  EntityName {
    kind: EntityKind::Definitions,
    name: "definitions",
    aliases: &["d", "definition", "def", "defs"],
    description: "Reusable test job descriptions",
  },
  EntityName {
    kind: EntityKind::Runs,
    name: "runs",
    aliases: &["r", "run"],
    description: "Test executions",
  },
  EntityName {
    kind: EntityKind::Suites,
    name: "suites",
    aliases: &["s", "suite"],
    description: "Groups of definitions",
  },
];

impl EntityKind {
  pub fn name(self) -> &'static str {
    ENTITIES
      .iter()
      .find(|e| e.kind == self)
      .map(|e| e.name)
      .unwrap_or("unknown")
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

fn ranked(input: &str) -> Vec<(&'static EntityName, u32)> {
  let input_lower = input.trim().to_lowercase();

  if input_lower.is_empty() {
    return ENTITIES.iter().map(|e| (e, 0)).collect();
  }

  let mut matches: Vec<(&EntityName, u32)> = Vec::new();

  for entity in ENTITIES {
    if entity.name == input_lower {
      matches.push((entity, 0));
    } else if entity.aliases.contains(&input_lower.as_str()) {
      matches.push((entity, 1));
    } else if entity.name.starts_with(&input_lower) {
      matches.push((entity, 2));
    } else if entity.aliases.iter().any(|a| a.starts_with(&input_lower)) {
      matches.push((entity, 3));
    }
  }

  matches.sort_by_key(|(_, priority)| *priority);
  matches
}

impl FromStr for EntityKind {
  type Err = String;

  /// Resolve a name, alias or unambiguous prefix.
  fn from_str(input: &str) -> Result<Self, Self::Err> {
    let matches = ranked(input);
    let names = || {
      ENTITIES
        .iter()
        .map(|e| format!("{} ({})", e.name, e.description))
        .collect::<Vec<_>>()
        .join(", ")
    };

    match matches.as_slice() {
      [] => Err(format!("unknown entity {:?} (expected one of {})", input, names())),
      [(best, p), rest @ ..] if input.trim().is_empty() || rest.iter().any(|(_, q)| q == p) => {
        let tied: Vec<_> = std::iter::once(best.name)
          .chain(rest.iter().filter(|(_, q)| q == p).map(|(e, _)| e.name))
          .collect();
        Err(format!("ambiguous entity {:?}: {}", input, tied.join(", ")))
      }
      [(best, _), ..] => Ok(best.kind),
    }
  }
}
