use std::collections::HashMap;

use crate::model::{ParseError, Project};

/// Stable topological sort of `projects` on their `after` edges.
///
/// Among the projects whose prerequisites are already placed, the one declared
/// first in the manifest goes next, so a manifest that is already in a valid
/// order is returned unchanged.
pub fn build_order(projects: &[Project]) -> Result<Vec<&Project>, ParseError> {
    let index: HashMap<&str, usize> = projects
        .iter()
        .enumerate()
        .map(|(i, p)| (p.name.as_str(), i))
        .collect();

    let mut pending = vec![0usize; projects.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); projects.len()];
    for (i, project) in projects.iter().enumerate() {
        for after in &project.after {
            let &j = index
                .get(after.as_str())
                .ok_or_else(|| ParseError::UnknownDependency {
                    project: project.name.clone(),
                    after: after.clone(),
                })?;
            pending[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut placed = vec![false; projects.len()];
    let mut ordered = Vec::with_capacity(projects.len());
    while ordered.len() < projects.len() {
        let next = (0..projects.len()).find(|&i| !placed[i] && pending[i] == 0);
        let Some(next) = next else {
            let stuck = (0..projects.len())
                .filter(|&i| !placed[i])
                .map(|i| projects[i].name.clone())
                .collect();
            return Err(ParseError::DependencyCycle(stuck));
        };
        placed[next] = true;
        for &dependent in &dependents[next] {
            pending[dependent] -= 1;
        }
        ordered.push(&projects[next]);
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn project(name: &str, after: &[&str]) -> Project {
        Project {
            name: name.to_string(),
            url: format!("https://git.suckless.org/{name}"),
            after: after.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn names<'a>(projects: &[&'a Project]) -> Vec<&'a str> {
        projects.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn prerequisites_come_first_regardless_of_declaration() {
        let projects = vec![
            project("dwm", &["slstatus"]),
            project("st", &[]),
            project("dmenu", &[]),
            project("slstatus", &["st", "dmenu"]),
        ];
        let order = build_order(&projects).unwrap();
        assert_eq!(names(&order), vec!["st", "dmenu", "slstatus", "dwm"]);
    }

    #[test]
    fn valid_declaration_order_is_kept() {
        let projects = vec![project("a", &[]), project("b", &[]), project("c", &["a", "b"])];
        let order = build_order(&projects).unwrap();
        assert_eq!(names(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_prerequisite() {
        let projects = vec![project("dwm", &["slock"])];
        assert!(matches!(
            build_order(&projects),
            Err(ParseError::UnknownDependency { .. })
        ));
    }

    #[test]
    fn cycle_reports_stuck_projects() {
        let projects = vec![
            project("st", &[]),
            project("a", &["b"]),
            project("b", &["a"]),
        ];
        match build_order(&projects) {
            Err(ParseError::DependencyCycle(stuck)) => {
                assert_eq!(stuck, vec!["a".to_string(), "b".to_string()])
            }
            other => panic!("expected a cycle, got {other:?}"),
        }
    }
}
