use cdconf_merge::{merge3, ConflictKind, LineMerge, TextMergeStrategy};
use proptest::prelude::*;

const ANCESTOR: &str = "\
schema_version: 1
pipeline_groups:
- name: apps
  pipelines:
  - name: build
    timeout_minutes: 10
    materials:
    - type: git
      url: https://example.com/app.git
  - name: deploy
    timeout_minutes: 30
    materials:
    - type: dependency
      pipeline: build
      stage: compile
";

#[test]
fn test_edits_to_different_pipelines_merge() {
    let ours = ANCESTOR.replace("timeout_minutes: 10", "timeout_minutes: 20");
    let theirs = ANCESTOR.replace("timeout_minutes: 30", "timeout_minutes: 45");

    let merged = LineMerge.merge(ANCESTOR, &ours, &theirs).unwrap();
    assert!(merged.contains("timeout_minutes: 20"));
    assert!(merged.contains("timeout_minutes: 45"));
    assert_eq!(merged.lines().count(), ANCESTOR.lines().count());
}

#[test]
fn test_same_field_edited_twice_conflicts() {
    let ours = ANCESTOR.replace("timeout_minutes: 10", "timeout_minutes: 20");
    let theirs = ANCESTOR.replace("timeout_minutes: 10", "timeout_minutes: 15");

    let err = LineMerge.merge(ANCESTOR, &ours, &theirs).unwrap_err();
    assert_eq!(err.regions.len(), 1);
    assert_eq!(err.regions[0].kind, ConflictKind::OverlappingEdit);
    assert_eq!(err.regions[0].ancestor_lines, Some(6..=6));
    assert!(err.marked_regions().contains("timeout_minutes: 15"));
}

#[test]
fn test_pipeline_appended_while_other_edited() {
    let ours = format!(
        "{ANCESTOR}  - name: smoke\n    materials:\n    - type: git\n      url: https://example.com/smoke.git\n"
    );
    let theirs = ANCESTOR.replace("url: https://example.com/app.git", "url: https://example.com/app2.git");

    let merged = merge3(ANCESTOR, &ours, &theirs).unwrap();
    assert!(merged.contains("app2.git"));
    assert!(merged.ends_with("smoke.git\n"));
}

proptest! {
    #[test]
    fn prop_merge_is_symmetric_on_success(
        i in 0usize..15,
        j in 0usize..15,
    ) {
        let base: Vec<&str> = ANCESTOR.split_inclusive('\n').collect();
        prop_assume!(i != j);

        let mut ours: Vec<String> = base.iter().map(ToString::to_string).collect();
        ours[i] = format!("# ours {i}\n");
        let mut theirs: Vec<String> = base.iter().map(ToString::to_string).collect();
        theirs[j] = format!("# theirs {j}\n");

        let a = merge3(ANCESTOR, &ours.concat(), &theirs.concat()).unwrap();
        let b = merge3(ANCESTOR, &theirs.concat(), &ours.concat()).unwrap();
        prop_assert_eq!(a, b);
    }
}
