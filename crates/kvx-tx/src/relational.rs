//! Relational model synthesis and DDL emission.
//!
//! Two passes over the assembled entity instances: the first ensures a table
//! exists for every entity, aggregate, and aggregate-array name; the second
//! sets primary keys, discovers foreign keys by fuzzy name matching, and
//! records value observations per column. Type inference and nullability run
//! once at the end, after which tables are read-only.

use crate::fuzzy;
use indexmap::IndexMap;
use kvx_core::{Attribute, ColumnType, EntityObject, PrimaryKey, Table};
use regex::Regex;
use std::sync::OnceLock;

/// Minimum similarity for two names to be treated as the same concept.
pub const DEFAULT_THRESHOLD: u32 = 75;

/// Sample value recorded for synthetic `*_id` key columns. A placeholder:
/// it only seeds type inference and nullability counting.
const PK_SAMPLE: i64 = 999;

/// Best fuzzy match for `name` among `candidates`: `(score, winner)`.
/// Earlier candidates win ties.
pub fn find_relation<'a>(name: &str, candidates: &'a [String]) -> (u32, Option<&'a str>) {
    let mut score = 0;
    let mut best = None;
    for candidate in candidates {
        let ratio = fuzzy::weighted_ratio(name, candidate);
        if ratio > score {
            score = ratio;
            best = Some(candidate.as_str());
        }
    }
    (score, best)
}

fn int_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+$").expect("static regex"))
}

fn decimal_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^-?\d+([.,]\d+)?$").expect("static regex"))
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

fn time_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{2}:\d{2}:\d{2}$").expect("static regex"))
}

fn timestamp_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$").expect("static regex"))
}

fn classify_value(value: &str) -> ColumnType {
    if int_re().is_match(value) {
        ColumnType::Integer
    } else if decimal_re().is_match(value) {
        ColumnType::Decimal
    } else if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
        ColumnType::Boolean
    } else if date_re().is_match(value) {
        ColumnType::Date
    } else if time_re().is_match(value) {
        ColumnType::Time
    } else if timestamp_re().is_match(value) {
        ColumnType::Timestamp
    } else {
        ColumnType::Text
    }
}

/// Vote a column type over the observed values. The most frequent type
/// wins; ties go to the type seen first.
pub fn infer_data_type(values: &[String]) -> ColumnType {
    let mut votes: IndexMap<ColumnType, usize> = IndexMap::new();
    for value in values {
        *votes.entry(classify_value(value)).or_default() += 1;
    }
    let mut best: Option<(ColumnType, usize)> = None;
    for (data_type, count) in votes {
        if best.map_or(true, |(_, n)| count > n) {
            best = Some((data_type, count));
        }
    }
    best.map(|(t, _)| t).unwrap_or(ColumnType::Text)
}

/// The attribute loop: record each named attribute as a column, discovering
/// foreign keys by similarity against the other table names.
fn process_attributes<'a, I>(attrs: I, table: &mut Table, table_names: &[String], threshold: u32)
where
    I: IntoIterator<Item = &'a Attribute>,
{
    for attr in attrs {
        let Some(name) = attr.name.as_deref() else {
            continue;
        };
        if name.is_empty() || name.eq_ignore_ascii_case("id") {
            continue;
        }

        if table.columns.contains_key(name) || table.has_foreign_key_column(name) {
            // Schema already known, only record the value.
            table.add_column(name, &attr.value);
            continue;
        }

        let (score, best) = find_relation(name, table_names);
        table.add_column(name, &attr.value);
        if score >= threshold {
            if let Some(ref_table) = best {
                table.add_foreign_key(name, ref_table, &format!("{}_id", ref_table));
            }
        }
    }
}

fn names_except(table_names: &[String], exclude: &str) -> Vec<String> {
    table_names
        .iter()
        .filter(|name| name.as_str() != exclude)
        .cloned()
        .collect()
}

/// Build the relational model from the assembled entity instances.
pub fn generate_relational_model(
    objects: &[EntityObject],
    threshold: u32,
) -> IndexMap<String, Table> {
    let mut tables: IndexMap<String, Table> = IndexMap::new();

    // First pass: a table per entity, aggregate, and aggregate-array name.
    for object in objects {
        tables
            .entry(object.name.clone())
            .or_insert_with(|| Table::new(&object.name));
        for name in object.aggregates.keys() {
            tables.entry(name.clone()).or_insert_with(|| Table::new(name));
        }
        for name in object.aggregate_arrays.keys() {
            tables.entry(name.clone()).or_insert_with(|| Table::new(name));
        }
    }

    let table_names: Vec<String> = tables.keys().cloned().collect();

    // Second pass: keys, relationships, and value observations.
    for object in objects {
        let entity_name = object.name.as_str();
        let entity_id_col = format!("{}_id", entity_name);

        {
            let table = tables
                .entry(entity_name.to_string())
                .or_insert_with(|| Table::new(entity_name));
            table.count += 1;
            table.add_column(&entity_id_col, PK_SAMPLE);
            table.set_primary_key(&entity_id_col);

            let filtered = names_except(&table_names, entity_name);
            process_attributes(&object.attributes, table, &filtered, threshold);
        }

        // 1:1 aggregates: the parent entity references the aggregate table.
        for (agg_name, attrs) in &object.aggregates {
            let agg_id_col = format!("{}_id", agg_name);
            {
                let table = tables
                    .entry(agg_name.clone())
                    .or_insert_with(|| Table::new(agg_name));
                table.count += 1;
                table.add_column(&agg_id_col, PK_SAMPLE);
                table.set_primary_key(&agg_id_col);
            }
            {
                let parent = tables
                    .entry(entity_name.to_string())
                    .or_insert_with(|| Table::new(entity_name));
                parent.add_column(&agg_id_col, PK_SAMPLE);
                parent.add_foreign_key(&agg_id_col, agg_name, &agg_id_col);
            }
            let filtered = names_except(&table_names, agg_name);
            let table = tables
                .entry(agg_name.clone())
                .or_insert_with(|| Table::new(agg_name));
            process_attributes(attrs, table, &filtered, threshold);
        }

        // Aggregate arrays: N:N when the array name resembles another table,
        // 1:N otherwise.
        for (arr_name, slots) in &object.aggregate_arrays {
            let filtered = names_except(&table_names, arr_name);
            let (score, matched) = find_relation(arr_name, &filtered);

            for attrs in slots.values() {
                let table = tables
                    .entry(arr_name.clone())
                    .or_insert_with(|| Table::new(arr_name));
                table.count += 1;
                table.add_column(&entity_id_col, PK_SAMPLE);
                table.add_foreign_key(&entity_id_col, entity_name, &entity_id_col);

                let mut element_attrs: Vec<&Attribute> = attrs.iter().collect();
                let mut candidates = filtered.clone();

                if score >= threshold {
                    if let Some(partner) = matched {
                        let partner_id_col = format!("{}_id", partner);

                        // The element attribute closest to the partner name
                        // is its foreign key, when it scores high enough.
                        let mut best: Option<(u32, &Attribute)> = None;
                        for attr in &element_attrs {
                            if let Some(name) = &attr.name {
                                let ratio = fuzzy::weighted_ratio(name, partner);
                                if best.map_or(true, |(b, _)| ratio > b) {
                                    best = Some((ratio, *attr));
                                }
                            }
                        }

                        match best.filter(|(ratio, _)| *ratio >= threshold) {
                            Some((_, fk_attr)) => {
                                let fk_name = fk_attr.name.clone().unwrap_or_default();
                                table.add_column(&fk_name, &fk_attr.value);
                                table.add_foreign_key(&fk_name, partner, &partner_id_col);
                                table.set_composite_key(&entity_id_col, &fk_name);
                                element_attrs
                                    .retain(|attr| attr.name.as_deref() != Some(fk_name.as_str()));
                            }
                            None => {
                                table.add_column(&partner_id_col, PK_SAMPLE);
                                table.add_foreign_key(&partner_id_col, partner, &partner_id_col);
                                table.set_composite_key(&entity_id_col, &partner_id_col);
                            }
                        }
                        candidates.retain(|name| name != partner);
                    }
                } else {
                    let arr_id_col = format!("{}_id", arr_name);
                    table.add_column(&arr_id_col, PK_SAMPLE);
                    table.set_primary_key(&arr_id_col);
                }

                process_attributes(element_attrs, table, &candidates, threshold);
            }
        }
    }

    // Finalization: type inference and nullability, then the observations
    // are dropped.
    for table in tables.values_mut() {
        let count = table.count;
        for column in table.columns.values_mut() {
            column.data_type = infer_data_type(&column.values);
            column.nullable = (column.values.len() as u64) < count;
            column.values.clear();
        }
    }

    tables
}

/// Emit one `CREATE TABLE` statement per table.
pub fn generate_sql_schema(tables: &IndexMap<String, Table>) -> Vec<String> {
    let mut statements = Vec::new();

    for (name, table) in tables {
        let mut lines = Vec::new();

        // A simple primary key leads the column list.
        if let Some(PrimaryKey::Single(pk)) = &table.primary_key {
            lines.push(format!("{} INTEGER PRIMARY KEY", pk));
        }

        for column in table.columns.values() {
            if let Some(PrimaryKey::Single(pk)) = &table.primary_key {
                if &column.name == pk {
                    continue;
                }
            }
            let mut field = format!("{} {}", column.name, column.data_type);
            if !column.nullable {
                field.push_str(" NOT NULL");
            }
            lines.push(field);
        }

        // A composite key follows its member columns.
        if let Some(PrimaryKey::Composite(first, second)) = &table.primary_key {
            lines.push(format!("PRIMARY KEY ({}, {})", first, second));
        }

        for fk in &table.foreign_keys {
            lines.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.ref_table, fk.ref_column
            ));
        }

        statements.push(format!(
            "CREATE TABLE {} (\n    {}\n);",
            name,
            lines.join(",\n    ")
        ));
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvx_core::Value;

    fn attr(name: &str, value: &str) -> Attribute {
        Attribute::new(Some(name.to_string()), Value::Str(value.to_string()))
    }

    fn user_with_name() -> EntityObject {
        let mut user = EntityObject::new("User", "1");
        user.add_entity_attribute(Some("name".into()), Value::Str("Alice".into()));
        user
    }

    #[test]
    fn flat_entity_becomes_one_table() {
        let tables = generate_relational_model(&[user_with_name()], DEFAULT_THRESHOLD);
        assert_eq!(tables.len(), 1);
        let user = &tables["User"];
        assert_eq!(user.primary_key, Some(PrimaryKey::Single("User_id".into())));
        assert_eq!(user.count, 1);
        let name = &user.columns["name"];
        assert_eq!(name.data_type, ColumnType::Text);
        assert!(!name.nullable);

        let ddl = generate_sql_schema(&tables);
        assert_eq!(
            ddl[0],
            "CREATE TABLE User (\n    User_id INTEGER PRIMARY KEY,\n    name TEXT NOT NULL\n);"
        );
    }

    #[test]
    fn one_to_one_aggregate_spawns_referenced_table() {
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_attribute("Addr", Some("city".into()), Value::Str("NYC".into()));
        user.add_aggregate_attribute("Addr", Some("zip".into()), Value::Str("10001".into()));

        let tables = generate_relational_model(&[user], DEFAULT_THRESHOLD);
        assert_eq!(tables.len(), 2);

        let user_table = &tables["User"];
        assert!(user_table.columns.contains_key("Addr_id"));
        assert!(user_table.foreign_keys.iter().any(|fk| {
            fk.column == "Addr_id" && fk.ref_table == "Addr" && fk.ref_column == "Addr_id"
        }));

        let addr = &tables["Addr"];
        assert_eq!(addr.primary_key, Some(PrimaryKey::Single("Addr_id".into())));
        assert!(!addr.columns["city"].nullable);
        assert!(!addr.columns["zip"].nullable);
    }

    #[test]
    fn array_matching_another_table_becomes_n_to_n() {
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_array_attribute(
            "watchedMovies",
            "1.0",
            Some("movie_id".into()),
            Value::Str("42".into()),
        );
        user.add_aggregate_array_attribute(
            "watchedMovies",
            "1.0",
            Some("rating".into()),
            Value::Str("5".into()),
        );
        let mut movie = EntityObject::new("Movie", "42");
        movie.add_entity_attribute(Some("title".into()), Value::Str("X".into()));

        let tables = generate_relational_model(&[user, movie], DEFAULT_THRESHOLD);
        let watched = &tables["watchedMovies"];

        assert_eq!(
            watched.primary_key,
            Some(PrimaryKey::Composite("User_id".into(), "movie_id".into()))
        );
        assert!(watched.foreign_keys.iter().any(|fk| fk.ref_table == "User"));
        assert!(watched
            .foreign_keys
            .iter()
            .any(|fk| fk.column == "movie_id" && fk.ref_table == "Movie" && fk.ref_column == "Movie_id"));
        assert_eq!(watched.columns["movie_id"].data_type, ColumnType::Integer);
        assert!(watched.columns.contains_key("rating"));
    }

    #[test]
    fn array_without_partner_table_becomes_one_to_n() {
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_array_attribute(
            "sessions",
            "1.0",
            Some("started".into()),
            Value::Str("2024-01-01".into()),
        );

        let tables = generate_relational_model(&[user], DEFAULT_THRESHOLD);
        let sessions = &tables["sessions"];
        assert_eq!(
            sessions.primary_key,
            Some(PrimaryKey::Single("sessions_id".into()))
        );
        assert!(sessions
            .foreign_keys
            .iter()
            .any(|fk| fk.column == "User_id" && fk.ref_table == "User"));
        assert_eq!(sessions.columns["started"].data_type, ColumnType::Date);
    }

    #[test]
    fn reference_list_synthesizes_partner_key() {
        // favoriteMovies[0] = 42 carries no attribute name, so the partner
        // key column is synthesized.
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_array_attribute("favoriteMovies", "1.0", None, Value::Str("42".into()));
        let movie = EntityObject::new("Movie", "42");

        let tables = generate_relational_model(&[user, movie], DEFAULT_THRESHOLD);
        let favorites = &tables["favoriteMovies"];
        assert_eq!(
            favorites.primary_key,
            Some(PrimaryKey::Composite("User_id".into(), "Movie_id".into()))
        );
        assert!(favorites
            .foreign_keys
            .iter()
            .any(|fk| fk.column == "Movie_id" && fk.ref_table == "Movie"));
    }

    #[test]
    fn nullability_tracks_observation_counts() {
        let mut a = EntityObject::new("User", "1");
        a.add_entity_attribute(Some("name".into()), Value::Str("Alice".into()));
        a.add_entity_attribute(Some("email".into()), Value::Str("a@x.io".into()));
        let mut b = EntityObject::new("User", "2");
        b.add_entity_attribute(Some("name".into()), Value::Str("Bob".into()));

        let tables = generate_relational_model(&[a, b], DEFAULT_THRESHOLD);
        let user = &tables["User"];
        assert_eq!(user.count, 2);
        assert!(!user.columns["name"].nullable);
        assert!(user.columns["email"].nullable);
        // Observations are cleared after finalization.
        assert!(user.columns["name"].values.is_empty());
    }

    #[test]
    fn foreign_keys_reference_existing_tables_and_their_keys() {
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_attribute("Addr", Some("city".into()), Value::Str("NYC".into()));
        user.add_aggregate_array_attribute(
            "watchedMovies",
            "1.0",
            Some("movie_id".into()),
            Value::Str("42".into()),
        );
        let movie = EntityObject::new("Movie", "42");

        let tables = generate_relational_model(&[user, movie], DEFAULT_THRESHOLD);
        for table in tables.values() {
            for fk in &table.foreign_keys {
                let target = tables.get(&fk.ref_table).expect("referenced table exists");
                match &target.primary_key {
                    Some(PrimaryKey::Single(pk)) => assert_eq!(&fk.ref_column, pk),
                    Some(PrimaryKey::Composite(a, b)) => {
                        assert!(&fk.ref_column == a || &fk.ref_column == b)
                    }
                    None => panic!("referenced table {} has no primary key", target.name),
                }
            }
        }
    }

    #[test]
    fn id_attributes_are_skipped() {
        let mut user = EntityObject::new("User", "1");
        user.add_entity_attribute(Some("id".into()), Value::Str("1".into()));
        user.add_entity_attribute(Some("name".into()), Value::Str("Alice".into()));

        let tables = generate_relational_model(&[user], DEFAULT_THRESHOLD);
        assert!(!tables["User"].columns.contains_key("id"));
        assert!(tables["User"].columns.contains_key("name"));
    }

    #[test]
    fn type_voting_prefers_majority_then_first_seen() {
        assert_eq!(
            infer_data_type(&["1".into(), "2".into(), "x".into()]),
            ColumnType::Integer
        );
        assert_eq!(
            infer_data_type(&["1".into(), "x".into()]),
            ColumnType::Integer
        );
        assert_eq!(
            infer_data_type(&["1.5".into(), "2,5".into()]),
            ColumnType::Decimal
        );
        assert_eq!(
            infer_data_type(&["True".into(), "false".into()]),
            ColumnType::Boolean
        );
        assert_eq!(infer_data_type(&["2024-01-01".into()]), ColumnType::Date);
        assert_eq!(infer_data_type(&["12:30:00".into()]), ColumnType::Time);
        assert_eq!(
            infer_data_type(&["2024-01-01 12:30:00".into()]),
            ColumnType::Timestamp
        );
        assert_eq!(infer_data_type(&[]), ColumnType::Text);
    }

    #[test]
    fn composite_key_tables_emit_key_line_after_columns() {
        let mut user = EntityObject::new("User", "1");
        user.add_aggregate_array_attribute(
            "watchedMovies",
            "1.0",
            Some("movie_id".into()),
            Value::Str("42".into()),
        );
        let movie = EntityObject::new("Movie", "42");

        let tables = generate_relational_model(&[user, movie], DEFAULT_THRESHOLD);
        let ddl = generate_sql_schema(&tables);
        let watched = ddl
            .iter()
            .find(|s| s.starts_with("CREATE TABLE watchedMovies"))
            .expect("watchedMovies ddl");
        assert!(watched.contains("PRIMARY KEY (User_id, movie_id)"));
        assert!(watched.contains("FOREIGN KEY (User_id) REFERENCES User(User_id)"));
        assert!(watched.contains("FOREIGN KEY (movie_id) REFERENCES Movie(Movie_id)"));
        assert!(!watched.contains("INTEGER PRIMARY KEY"));
    }

    #[test]
    fn attribute_loop_records_values_only_for_known_columns() {
        let mut table = Table::new("User");
        table.add_column("name", "Alice");
        let names = vec!["Movie".to_string()];
        process_attributes(
            &[attr("name", "Bob")],
            &mut table,
            &names,
            DEFAULT_THRESHOLD,
        );
        assert_eq!(table.columns["name"].values, vec!["Alice", "Bob"]);
        assert!(table.foreign_keys.is_empty());
    }
}
