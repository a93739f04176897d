use std::collections::HashMap;

use super::model::{MetadataRecord, MetadataValue};

// ---------------------------------------------------------------------------
// Selection: which records satisfy a set of attribute constraints
// ---------------------------------------------------------------------------

/// Attribute name → required value. The value `"*"` only requires the
/// attribute to be present. Built with [`super::model::record`].
pub type Constraints = MetadataRecord;

/// Return the records that satisfy every constraint, in their original order.
///
/// A record passes a constraint when:
/// * it has the attribute, and
/// * the constraint is the wildcard `"*"`, or the values are equal
///
/// With no constraints every record is returned.
pub fn select(metadata: &[MetadataRecord], constraints: &Constraints) -> Vec<MetadataRecord> {
    metadata
        .iter()
        .filter(|attributes| satisfies(attributes, constraints))
        .cloned()
        .collect()
}

fn satisfies(attributes: &MetadataRecord, constraints: &Constraints) -> bool {
    constraints.iter().all(|(name, required)| match attributes.get(name) {
        Some(value) => required.is_wildcard() || value.loosely_equals(required),
        None => false,
    })
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// How grouped metadata should be sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sort {
    /// Only sort the group keys, keep each group's members in input order.
    Groups,
    /// Sort the group keys and each group's members by these attributes.
    By(Vec<String>),
}

impl Sort {
    pub fn by<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Sort::By(keys.into_iter().map(Into::into).collect())
    }

    fn member_keys(&self) -> &[String] {
        match self {
            Sort::Groups => &[],
            Sort::By(keys) => keys,
        }
    }
}

/// Stable, case-insensitive sort on the string form of the given attributes.
/// A missing attribute sorts as the empty string.
pub fn sort<S: AsRef<str>>(mut metadata: Vec<MetadataRecord>, keys: &[S]) -> Vec<MetadataRecord> {
    if keys.is_empty() {
        return metadata;
    }
    metadata.sort_by_cached_key(|attributes| {
        keys.iter()
            .map(|k| {
                attributes
                    .get(k.as_ref())
                    .map(MetadataValue::sort_text)
                    .unwrap_or_default()
            })
            .collect::<Vec<String>>()
    });
    metadata
}

// ---------------------------------------------------------------------------
// Grouping
// ---------------------------------------------------------------------------

/// Records grouped by the value of one attribute.
///
/// Groups keep the order in which their key was first seen unless they were
/// sorted. Records without the attribute are collected under
/// [`MetadataValue::Null`]. Integral floats share a group with the equal
/// integer; the group is keyed by whichever value came first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataGroups {
    groups: Vec<(MetadataValue, Vec<MetadataRecord>)>,
}

impl MetadataGroups {
    pub fn get(&self, key: &MetadataValue) -> Option<&[MetadataRecord]> {
        self.groups
            .iter()
            .find(|(k, _)| k.group_key() == key.group_key())
            .map(|(_, members)| members.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &MetadataValue> {
        self.groups.iter().map(|(k, _)| k)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&MetadataValue, &[MetadataRecord])> {
        self.groups.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

impl IntoIterator for MetadataGroups {
    type Item = (MetadataValue, Vec<MetadataRecord>);
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}

/// Group records by `attribute`, optionally sorting the result
/// (see [`sort_groups`]).
pub fn group(metadata: Vec<MetadataRecord>, attribute: &str, sort: Option<&Sort>) -> MetadataGroups {
    let mut index: HashMap<MetadataValue, usize> = HashMap::new();
    let mut groups: Vec<(MetadataValue, Vec<MetadataRecord>)> = Vec::new();

    for attributes in metadata {
        let key = attributes
            .get(attribute)
            .cloned()
            .unwrap_or(MetadataValue::Null);
        let slot = *index.entry(key.group_key()).or_insert_with(|| {
            groups.push((key, Vec::new()));
            groups.len() - 1
        });
        groups[slot].1.push(attributes);
    }

    let groups = MetadataGroups { groups };
    match sort {
        Some(spec) => sort_groups(groups, spec),
        None => groups,
    }
}

/// Sort group keys case-insensitively (the null key sorts as the empty
/// string). Unless `sort` is [`Sort::Groups`], each group's members are
/// sorted by the given attributes too.
pub fn sort_groups(groups: MetadataGroups, sort_spec: &Sort) -> MetadataGroups {
    let mut groups = groups.groups;
    groups.sort_by_cached_key(|(key, _)| group_sort_text(key));

    let keys = sort_spec.member_keys();
    let groups = groups
        .into_iter()
        .map(|(key, members)| (key, sort(members, keys)))
        .collect();
    MetadataGroups { groups }
}

fn group_sort_text(key: &MetadataValue) -> String {
    if key.is_null() {
        String::new()
    } else {
        key.sort_text()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::model::record;

    fn fixture() -> Vec<MetadataRecord> {
        vec![
            record([("short_name", "tas"), ("exp", "ssp585"), ("dataset", "MPI-ESM")]),
            record([("short_name", "tas"), ("exp", "historical"), ("dataset", "ACCESS1-0")]),
            record([("short_name", "pr"), ("exp", "historical"), ("dataset", "bcc-csm1-1")]),
            record([("short_name", "pr"), ("dataset", "CanESM2")]),
            record([("short_name", "TAS"), ("exp", "Historical"), ("dataset", "access1-3")]),
        ]
    }

    #[test]
    fn select_by_value() {
        let metadata = vec![
            record([("var", "tas"), ("exp", "ssp")]),
            record([("var", "tas"), ("exp", "hist")]),
        ];
        let selected = select(&metadata, &record([("var", "tas")]));
        assert_eq!(selected, metadata);
    }

    #[test]
    fn select_returns_exactly_the_satisfying_records() {
        let metadata = fixture();
        let constraints = record([("short_name", "tas"), ("exp", "historical")]);
        let selected = select(&metadata, &constraints);

        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0]["dataset"], MetadataValue::from("ACCESS1-0"));
        for rec in &metadata {
            let expected = rec.get("short_name") == Some(&"tas".into())
                && rec.get("exp") == Some(&"historical".into());
            assert_eq!(selected.contains(rec), expected);
        }
    }

    #[test]
    fn wildcard_requires_presence_only() {
        let selected = select(&fixture(), &record([("exp", "*")]));
        assert_eq!(selected.len(), 4);
        assert!(selected.iter().all(|r| r.contains_key("exp")));
    }

    #[test]
    fn no_constraints_selects_everything() {
        let metadata = fixture();
        assert_eq!(select(&metadata, &Constraints::new()), metadata);
    }

    #[test]
    fn missing_attribute_never_matches() {
        assert!(select(&fixture(), &record([("ensemble", "r1i1p1")])).is_empty());
    }

    #[test]
    fn numeric_constraint_matches_across_types() {
        let metadata = vec![record([("start_year", MetadataValue::Integer(2000))])];
        let selected = select(&metadata, &record([("start_year", MetadataValue::Float(2000.0))]));
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn group_preserves_first_seen_order() {
        let metadata = vec![
            record([("var", "tas"), ("exp", "ssp")]),
            record([("var", "tas"), ("exp", "hist")]),
        ];
        let groups = group(metadata.clone(), "exp", None);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys, vec![MetadataValue::from("ssp"), MetadataValue::from("hist")]);
        assert_eq!(groups.get(&"ssp".into()), Some(&metadata[..1]));
        assert_eq!(groups.get(&"hist".into()), Some(&metadata[1..]));
    }

    #[test]
    fn group_partitions_the_input() {
        let metadata = fixture();
        let groups = group(metadata.clone(), "exp", None);

        let total: usize = groups.iter().map(|(_, members)| members.len()).sum();
        assert_eq!(total, metadata.len());

        for (key, members) in groups.iter() {
            for rec in members {
                match rec.get("exp") {
                    Some(value) => assert_eq!(value, key),
                    None => assert!(key.is_null()),
                }
            }
        }
        assert_eq!(groups.get(&MetadataValue::Null).map(<[_]>::len), Some(1));
    }

    #[test]
    fn sort_is_case_insensitive_and_stable() {
        let sorted = sort(fixture(), &["short_name"]);
        let names: Vec<String> = sorted.iter().map(|r| r["short_name"].to_string()).collect();
        assert_eq!(names, vec!["pr", "pr", "tas", "tas", "TAS"]);
        // equal keys keep their input order
        assert_eq!(sorted[0]["dataset"], MetadataValue::from("bcc-csm1-1"));
        assert_eq!(sorted[2]["dataset"], MetadataValue::from("MPI-ESM"));
    }

    #[test]
    fn sort_is_idempotent() {
        let once = sort(fixture(), &["exp", "dataset"]);
        let twice = sort(once.clone(), &["exp", "dataset"]);
        assert_eq!(once, twice);
        // missing `exp` sorts first as the empty string
        assert_eq!(once[0]["dataset"], MetadataValue::from("CanESM2"));
    }

    #[test]
    fn sort_groups_orders_keys_and_members() {
        let groups = group(fixture(), "exp", Some(&Sort::by(["dataset"])));
        let keys: Vec<String> = groups.keys().map(|k| k.to_string()).collect();
        assert_eq!(keys, vec!["null", "historical", "Historical", "ssp585"]);

        let hist = groups.get(&"historical".into()).unwrap();
        let datasets: Vec<String> = hist.iter().map(|r| r["dataset"].to_string()).collect();
        assert_eq!(datasets, vec!["ACCESS1-0", "bcc-csm1-1"]);
    }

    #[test]
    fn integer_and_equal_float_group_together() {
        let metadata = vec![
            record([("start_year", MetadataValue::Integer(2000)), ("id", "a".into())]),
            record([("start_year", MetadataValue::Float(2000.0)), ("id", "b".into())]),
            record([("start_year", MetadataValue::Float(2000.5)), ("id", "c".into())]),
        ];
        let constraint = record([("start_year", MetadataValue::Integer(2000))]);
        assert_eq!(select(&metadata, &constraint).len(), 2);

        let groups = group(metadata, "start_year", None);
        assert_eq!(groups.len(), 2);
        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(keys[0], MetadataValue::Integer(2000));
        assert_eq!(groups.get(&MetadataValue::Float(2000.0)).map(<[_]>::len), Some(2));
    }

    #[test]
    fn explicit_null_sorts_as_none() {
        let metadata = vec![
            record([("exp", MetadataValue::from("nov"))]),
            record([("exp", MetadataValue::Null)]),
            record([("exp", MetadataValue::from("abc"))]),
        ];
        let sorted = sort(metadata, &["exp"]);
        let exps: Vec<String> = sorted.iter().map(|r| r["exp"].sort_text()).collect();
        assert_eq!(exps, vec!["abc", "none", "nov"]);
    }

    #[test]
    fn sort_groups_only_keys() {
        let metadata = vec![
            record([("exp", "b"), ("id", "2")]),
            record([("exp", "a"), ("id", "9")]),
            record([("exp", "a"), ("id", "1")]),
        ];
        let groups = group(metadata, "exp", Some(&Sort::Groups));
        let (first_key, members) = groups.iter().next().unwrap();
        assert_eq!(first_key, &MetadataValue::from("a"));
        let ids: Vec<String> = members.iter().map(|r| r["id"].to_string()).collect();
        assert_eq!(ids, vec!["9", "1"]);
    }
}
