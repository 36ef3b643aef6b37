// Licensed under the Apache License, Version 2.0 (see LICENSE).

//! Resolves user-supplied selector strings to task sets.
//!
//! Grammar: `:` selects the root project's default tasks; `:a:b:c` is an absolute path; `a:b`
//! (no leading colon, more than one segment) is a path relative to the root; a single bare
//! segment `name` matches every task named `name` anywhere in the tree; a leading `^` excludes
//! rather than includes.

use std::collections::HashSet;

use crate::context::{Context, ProjectId, TaskId};
use crate::error::{Error, Result};
use crate::project::Member;

enum Selector {
    /// `path` is colon-joined without a leading colon; empty means the root itself.
    Absolute(String),
    Relative(String),
    Bare(String),
}

enum Term {
    Include(Selector),
    Exclude(Selector),
}

peg::parser! {
    grammar selector_grammar() for str {
        rule component() -> &'input str
            = s:$(['a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '-' | '.']+) { s }

        rule absolute() -> Selector
            = ":" segs:(component() ** ":") { Selector::Absolute(segs.join(":")) }

        rule relative() -> Selector
            = segs:(component() ++ ":") {
                if segs.len() == 1 {
                    Selector::Bare(segs[0].to_string())
                } else {
                    Selector::Relative(segs.join(":"))
                }
            }

        pub rule term() -> Term
            = exclude:"^"? sel:(absolute() / relative()) {
                match exclude {
                    Some(_) => Term::Exclude(sel),
                    None => Term::Include(sel),
                }
            }
    }
}

fn parse(raw: &str) -> Result<Term> {
    selector_grammar::term(raw).map_err(|_| Error::UnknownPath(raw.to_string()))
}

fn project_default_tasks(ctx: &Context, project: ProjectId) -> Vec<TaskId> {
    ctx.project_members(project)
        .into_iter()
        .filter_map(|(_, member)| match member {
            Member::Task(id) if ctx.task_default(id) => Some(id),
            _ => None,
        })
        .collect()
}

fn resolve_selector(ctx: &Context, selector: &Selector) -> Result<Vec<TaskId>> {
    match selector {
        Selector::Absolute(path) => {
            let root = ctx.root_project().id();
            if path.is_empty() {
                return Ok(project_default_tasks(ctx, root));
            }
            match ctx.resolve(root, &format!(":{path}"))? {
                Member::Task(id) => Ok(vec![id]),
                Member::Project(id) => Ok(project_default_tasks(ctx, id)),
            }
        }
        Selector::Relative(path) => {
            let root = ctx.root_project().id();
            match ctx.resolve(root, path)? {
                Member::Task(id) => Ok(vec![id]),
                Member::Project(id) => Ok(project_default_tasks(ctx, id)),
            }
        }
        Selector::Bare(name) => {
            let matches: Vec<TaskId> = ctx
                .all_tasks()
                .into_iter()
                .filter(|id| ctx.task_name(*id) == *name)
                .collect();
            if matches.is_empty() {
                Err(Error::UnknownTask(name.clone()))
            } else {
                Ok(matches)
            }
        }
    }
}

/// Parses and resolves every selector string, returning `(included, excluded)` task sets.
/// Exclusion (`^name`) is applied by the caller, after both sets are fully resolved.
pub(crate) fn resolve(ctx: &Context, selectors: &[&str]) -> Result<(HashSet<TaskId>, HashSet<TaskId>)> {
    let mut included = HashSet::new();
    let mut excluded = HashSet::new();
    for raw in selectors {
        match parse(raw)? {
            Term::Include(sel) => included.extend(resolve_selector(ctx, &sel)?),
            Term::Exclude(sel) => excluded.extend(resolve_selector(ctx, &sel)?),
        }
    }
    Ok((included, excluded))
}
