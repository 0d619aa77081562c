use super::*;
use crate::config::{CompilerConfig, LikeBinding};
use crate::dialect::{DatabaseFamily, Dialect};
use crate::error::CompileError;
use crate::fixtures;
use crate::metadata::EntityModel;
use pretty_assertions::assert_eq;

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

struct Setup {
    model: EntityModel,
    dialect: Box<dyn Dialect>,
    config: CompilerConfig,
}

impl Setup {
    fn new(model: EntityModel, family: DatabaseFamily) -> Self {
        Self {
            model,
            dialect: family.dialect(),
            config: CompilerConfig::default(),
        }
    }

    fn users() -> Self {
        Self::new(fixtures::user(), DatabaseFamily::H2)
    }

    fn compiler(&self) -> PredicateCompiler<'_> {
        PredicateCompiler::new(&self.model, self.dialect.as_ref(), &self.config)
    }

    fn render(&self, path: &str, op: Operator, values: &[&str]) -> String {
        self.compiler()
            .compile(path, op, IgnoreCase::Never, &names(values))
            .unwrap()
            .render()
    }
}

#[test]
fn greater_than_and_like_scenario() {
    let setup = Setup::users();
    let compiler = setup.compiler().with_alias(Some("alias"));
    let age = compiler
        .compile("age", Operator::GreaterThan, IgnoreCase::Never, &names(&["p1"]))
        .unwrap();
    let name = compiler
        .compile("name", Operator::Like, IgnoreCase::Never, &names(&["p2"]))
        .unwrap();
    assert_eq!(
        age.and(name).render(),
        "(alias.age > #{p1}) AND (alias.name LIKE #{p2} ESCAPE '\\')"
    );
}

#[test]
fn equality_on_nullable_property_checks_null() {
    let setup = Setup::users();
    assert_eq!(
        setup.render("name", Operator::SimpleProperty, &["p1"]),
        "(<choose><when test=\"p1 == null\">u.name IS NULL</when><otherwise>u.name = #{p1}</otherwise></choose>)"
    );
    assert_eq!(
        setup.render("email", Operator::NegatingSimpleProperty, &["p1"]),
        "(<choose><when test=\"p1 == null\">u.email IS NOT NULL</when><otherwise>u.email &lt;> #{p1}</otherwise></choose>)"
    );
    assert_eq!(setup.render("age", Operator::SimpleProperty, &["p1"]), "(u.age = #{p1})");
}

#[test]
fn comparison_operators() {
    let setup = Setup::users();
    assert_eq!(setup.render("age", Operator::LessThan, &["a"]), "(u.age &lt; #{a})");
    assert_eq!(setup.render("age", Operator::LessThanEqual, &["a"]), "(u.age &lt;= #{a})");
    assert_eq!(setup.render("age", Operator::GreaterThanEqual, &["a"]), "(u.age >= #{a})");
    assert_eq!(setup.render("createdAt", Operator::Before, &["t"]), "(u.created_at &lt; #{t})");
    assert_eq!(setup.render("createdAt", Operator::After, &["t"]), "(u.created_at > #{t})");
    assert_eq!(
        setup.render("age", Operator::Between, &["lo", "hi"]),
        "(u.age BETWEEN #{lo} AND #{hi})"
    );
}

#[test]
fn placeholders_carry_type_metadata() {
    let setup = Setup::users();
    assert_eq!(
        setup.render("id", Operator::SimpleProperty, &["p1"]),
        "(u.id = #{p1,javaType=java.lang.Long})"
    );
}

#[test]
fn containing_binds_an_escaped_pattern() {
    let setup = Setup::users();
    assert_eq!(
        setup.render("email", Operator::Containing, &["p1"]),
        "(<bind name=\"__p1_like\" value=\"'%' + p1.replace('\\\\', '\\\\\\\\').replace('%', '\\\\%').replace('_', '\\\\_') + '%'\"/> \
u.email LIKE #{__p1_like} ESCAPE '\\')"
    );
    let not = setup.render("email", Operator::NotContaining, &["p1"]);
    assert!(not.contains("u.email NOT LIKE #{__p1_like}"));
    let starts = setup.render("email", Operator::StartingWith, &["q.prefix"]);
    assert!(starts.starts_with("(<bind name=\"__q_prefix_like\" value=\"q.prefix.replace("));
    assert!(starts.contains("+ '%'\"/>"));
}

#[test]
fn concat_like_binding_keeps_wildcards_in_sql() {
    let mut setup = Setup::new(fixtures::user(), DatabaseFamily::MySql);
    setup.config = CompilerConfig::default().with_like_binding(LikeBinding::Concat);
    let rendered = setup.render("email", Operator::EndingWith, &["p1"]);
    assert!(rendered.ends_with("u.email LIKE CONCAT('%', #{__p1_like}) ESCAPE '\\\\')"), "{rendered}");
}

#[test]
fn in_and_empty_collections() {
    let setup = Setup::users();
    assert_eq!(
        setup.render("status", Operator::In, &["p1"]),
        "(u.status IN <choose><when test=\"p1 == null or p1.isEmpty()\">(NULL)</when><otherwise>\
<foreach collection=\"p1\" item=\"__item\" open=\"(\" close=\")\" separator=\",\">#{__item}</foreach>\
</otherwise></choose>)"
    );
    assert!(setup.render("status", Operator::NotIn, &["p1"]).starts_with("(u.status NOT IN <choose>"));
}

#[test]
fn null_and_boolean_checks() {
    let setup = Setup::users();
    assert_eq!(setup.render("email", Operator::IsNull, &[]), "(u.email IS NULL)");
    assert_eq!(setup.render("email", Operator::IsNotNull, &[]), "(u.email IS NOT NULL)");
    assert_eq!(setup.render("active", Operator::True, &[]), "(u.active = TRUE)");

    let oracle = Setup::new(fixtures::user(), DatabaseFamily::Oracle);
    assert_eq!(oracle.render("active", Operator::False, &[]), "(u.active = 0)");
}

#[test]
fn regex_depends_on_dialect() {
    let pg = Setup::new(fixtures::user(), DatabaseFamily::Postgres);
    assert_eq!(pg.render("name", Operator::Regex, &["r"]), "(u.name ~ #{r})");

    let oracle = Setup::new(fixtures::user(), DatabaseFamily::Oracle);
    let err = oracle
        .compiler()
        .compile("name", Operator::Regex, IgnoreCase::Never, &names(&["r"]))
        .unwrap_err();
    assert!(err.is_recoverable());
}

#[test]
fn unsupported_operators_are_recoverable() {
    let setup = Setup::users();
    for op in [Operator::IsEmpty, Operator::Near, Operator::Within, Operator::Exists] {
        let values: Vec<String> = (0..op.arity()).map(|i| format!("p{i}")).collect();
        let err = setup
            .compiler()
            .compile("name", op, IgnoreCase::Never, &values)
            .unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedQueryShape { .. }), "{op:?}");
    }
}

#[test]
fn ignore_case_policies() {
    let setup = Setup::users();
    let compiler = setup.compiler();
    let always = compiler
        .compile("email", Operator::Like, IgnoreCase::Always, &names(&["p1"]))
        .unwrap();
    assert_eq!(always.render(), "(LOWER(u.email) LIKE LOWER(#{p1}) ESCAPE '\\')");

    let err = compiler
        .compile("age", Operator::SimpleProperty, IgnoreCase::Always, &names(&["p1"]))
        .unwrap_err();
    assert_eq!(err, CompileError::UnsupportedIgnoreCase { property: "age".to_string() });

    let possible = compiler
        .compile("age", Operator::SimpleProperty, IgnoreCase::WhenPossible, &names(&["p1"]))
        .unwrap();
    assert_eq!(possible.render(), "(u.age = #{p1})");
}

#[test]
fn joined_properties_record_connectors() {
    let setup = Setup::users();
    let compiler = setup.compiler();
    let p = compiler
        .compile("department.name", Operator::SimpleProperty, IgnoreCase::Never, &names(&["p1"]))
        .unwrap();
    assert_eq!(p.render(), "(department.name = #{p1})");
    assert_eq!(p.connectors().iter().collect::<Vec<_>>(), vec!["department"]);
}

#[test]
fn connector_union_is_order_independent() {
    let a = || Predicate::new(vec![Fragment::literal("a")]).with_connectors(["x"]);
    let b = || Predicate::new(vec![Fragment::literal("b")]).with_connectors(["y", "x"]);
    let c = || Predicate::new(vec![Fragment::literal("c")]).with_connectors(["z"]);

    let left = a().and(b()).or(c());
    let right = c().or(b()).and(a());
    assert_eq!(left.all_connectors(), right.all_connectors());
    assert_eq!(left.all_connectors(), left.all_connectors());
    assert_eq!(
        left.all_connectors().into_iter().collect::<Vec<_>>(),
        vec!["x", "y", "z"]
    );
    assert_eq!(left.render(), "(a) AND (b) OR (c)");
}

#[test]
fn composite_ids_compare_every_component() {
    let setup = Setup::new(fixtures::order(), DatabaseFamily::H2);
    assert_eq!(
        setup.render("id", Operator::SimpleProperty, &["p1"]),
        "(o.tenant_id = #{p1.tenant} AND o.order_no = #{p1.number})"
    );
    assert_eq!(
        setup.render("id", Operator::NegatingSimpleProperty, &["p1"]),
        "(NOT (o.tenant_id = #{p1.tenant} AND o.order_no = #{p1.number}))"
    );
    let err = setup
        .compiler()
        .compile("id", Operator::GreaterThan, IgnoreCase::Never, &names(&["p1"]))
        .unwrap_err();
    assert!(err.is_recoverable());
}

#[test]
fn containing_on_collection_uses_join_table() {
    let setup = Setup::users();
    assert_eq!(
        setup.render("roles", Operator::Containing, &["p1"]),
        "(EXISTS (SELECT 1 FROM t_user_role WHERE t_user_role.user_id = u.id AND t_user_role.role_id = #{p1}))"
    );
    assert!(setup
        .render("roles", Operator::NotContaining, &["p1"])
        .starts_with("(NOT EXISTS (SELECT 1"));

    let err = setup
        .compiler()
        .compile("tags", Operator::Containing, IgnoreCase::Never, &names(&["p1"]))
        .unwrap_err();
    assert!(matches!(err, CompileError::UnsupportedQueryShape { .. }));
}

#[test]
fn unknown_property_and_arity_errors() {
    let setup = Setup::users();
    let compiler = setup.compiler();
    assert!(matches!(
        compiler.compile("nope", Operator::SimpleProperty, IgnoreCase::Never, &names(&["p1"])),
        Err(CompileError::UnknownProperty { .. })
    ));
    let err = compiler
        .compile("age", Operator::Between, IgnoreCase::Never, &names(&["p1"]))
        .unwrap_err();
    assert!(err.is_argument_mismatch());
}

#[test]
fn guarded_nodes_need_wrapping() {
    let setup = Setup::users();
    let criteria = Criteria::new()
        .and_if_present("name", Operator::Like, "name")
        .and("age", Operator::GreaterThan, ["minAge"]);
    let predicate = criteria.compile(&setup.compiler()).unwrap().unwrap();
    assert!(predicate.needs_wrapping());
    assert_eq!(
        predicate.render(),
        "<if test=\"name != null\">(u.name LIKE #{name} ESCAPE '\\')</if> AND (u.age > #{minAge})"
    );
}

#[test]
fn criteria_groups() {
    let setup = Setup::users();
    let criteria = Criteria::new()
        .and("status", Operator::SimpleProperty, ["status"])
        .or_group(
            Criteria::new()
                .and("age", Operator::GreaterThan, ["minAge"])
                .and("department.name", Operator::SimpleProperty, ["dept"]),
        );
    let predicate = criteria.compile(&setup.compiler()).unwrap().unwrap();
    assert_eq!(
        predicate.render(),
        "(u.status = #{status}) OR ((u.age > #{minAge}) AND (department.name = #{dept}))"
    );
    assert!(predicate.all_connectors().contains("department"));
    assert!(Criteria::new().compile(&setup.compiler()).unwrap().is_none());
}

#[test]
fn optional_groups_trim_their_leading_conjunction() {
    let setup = Setup::users();
    let criteria = Criteria::new()
        .and("status", Operator::SimpleProperty, ["status"])
        .and_group(
            Criteria::new()
                .and_if_present("name", Operator::Like, "name")
                .and_if_present("email", Operator::Like, "email"),
        );
    let rendered = criteria.compile(&setup.compiler()).unwrap().unwrap().render();
    assert_eq!(
        rendered,
        "(u.status = #{status}) <if test=\"(name != null) or (email != null)\">AND \
<trim prefix=\"(\" prefixOverrides=\"AND |OR \" suffix=\")\">\
<if test=\"name != null\">(u.name LIKE #{name} ESCAPE '\\')</if> \
<if test=\"email != null\">AND (u.email LIKE #{email} ESCAPE '\\')</if></trim></if>"
    );
}
