use super::*;
use crate::compile::{DeclaredQuery, QueryMethod};
use crate::config::CompilerConfig;
use crate::dialect::{DatabaseFamily, Dialect};
use crate::error::CompileError;
use crate::fixtures;
use crate::metadata::EntityModel;
use crate::method::MethodParameter;
use crate::preview::Previewer;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const USER_COLUMNS: &str = "u.id, u.name, u.age, u.email, u.active, u.status, u.created_at";

struct Setup {
    entity: EntityModel,
    dialect: Box<dyn Dialect>,
    config: CompilerConfig,
}

impl Setup {
    fn new(entity: EntityModel, family: DatabaseFamily) -> Self {
        Self {
            entity,
            dialect: family.dialect(),
            config: CompilerConfig::new(),
        }
    }

    /// Literal column lists, no dynamic sort: statements compare as plain strings.
    fn plain(family: DatabaseFamily) -> Self {
        let mut setup = Self::new(fixtures::user(), family);
        setup.config = CompilerConfig::new()
            .with_simple_statements(false)
            .with_dynamic_sort(false);
        setup
    }

    fn assembler(&self) -> Assembler<'_> {
        Assembler::new(&self.entity, self.dialect.as_ref(), &self.config)
    }

    fn method(&self, method: QueryMethod) -> Statement {
        self.assembler().query_method(&method).unwrap()
    }

    fn declared(&self, query: DeclaredQuery) -> Statement {
        self.assembler().declared_query(&query).unwrap()
    }
}

fn preview(statement: &Statement, params: Value) -> (String, Vec<Value>) {
    let preview = Previewer::new()
        .preview(statement.body().unwrap(), &params)
        .unwrap();
    (preview.sql, preview.parameters)
}

#[test]
fn paged_select_on_h2_gets_limit_offset_and_a_count() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.method(
        QueryMethod::new("findByAgeGreaterThan")
            .parameter(MethodParameter::new("Integer"))
            .parameter(MethodParameter::page("Pageable")),
    );

    assert_eq!(
        statement.render(),
        format!(
            "<select id=\"findByAgeGreaterThan_Integer_Pageable\" resultType=\"com.example.User\" \
             parameterType=\"map\">SELECT {USER_COLUMNS} FROM t_user u WHERE (u.age > #{{p1}}) \
             LIMIT #{{p2.pageSize}} OFFSET #{{p2.offset}}</select>"
        )
    );
    let (sql, params) = preview(
        &statement,
        json!({"p1": 18, "p2": {"offset": 10, "pageSize": 5}}),
    );
    assert_eq!(
        sql,
        format!("SELECT {USER_COLUMNS} FROM t_user u WHERE (u.age > ?) LIMIT ? OFFSET ?")
    );
    assert_eq!(params, vec![json!(18), json!(5), json!(10)]);

    let [count] = statement.derived.as_slice() else {
        panic!("expected one derived statement, got {:?}", statement.derived);
    };
    assert_eq!(
        count.render(),
        "<select id=\"findByAgeGreaterThan_Integer_Pageable__count\" resultType=\"long\" \
         parameterType=\"map\">SELECT COUNT(*) FROM t_user u WHERE (u.age > #{p1})</select>"
    );
}

#[test]
fn limit_without_page_is_folded() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.method(
        QueryMethod::new("findFirst3ByStatus").parameter(MethodParameter::new("String")),
    );
    assert!(
        statement
            .render()
            .ends_with("WHERE (u.status = #{p1}) LIMIT 3</select>")
    );
    assert!(statement.derived.is_empty());
}

#[test]
fn static_sort_follows_the_predicate() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.method(QueryMethod::new("findByActiveTrueOrderByAgeDescNameAsc"));
    assert_eq!(
        statement.render(),
        format!(
            "<select id=\"findByActiveTrueOrderByAgeDescNameAsc\" resultType=\"com.example.User\">\
             SELECT {USER_COLUMNS} FROM t_user u WHERE (u.active = TRUE) \
             ORDER BY u.age DESC, u.name ASC</select>"
        )
    );
}

#[test]
fn joined_properties_add_left_joins() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.method(
        QueryMethod::new("findByDepartmentName").parameter(MethodParameter::new("String")),
    );
    assert!(statement.render().contains(
        "FROM t_user u LEFT OUTER JOIN t_department department ON department.id = u.department_id \
         WHERE (department.name = #{p1})"
    ));
}

#[test]
fn count_and_exists_select_counts() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let count = setup.method(
        QueryMethod::new("countByStatus").parameter(MethodParameter::new("String")),
    );
    assert_eq!(
        count.render(),
        "<select id=\"countByStatus_String\" resultType=\"long\" parameterType=\"map\">\
         SELECT COUNT(*) FROM t_user u WHERE (u.status = #{p1})</select>"
    );

    let exists = setup.method(
        QueryMethod::new("existsByStatus").parameter(MethodParameter::new("String")),
    );
    assert!(exists.render().starts_with(
        "<select id=\"existsByStatus_String\" resultType=\"boolean\" parameterType=\"map\">SELECT COUNT(*)"
    ));
}

#[test]
fn distinct_count_uses_the_id_column() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let count = setup.method(
        QueryMethod::new("countDistinctByStatus").parameter(MethodParameter::new("String")),
    );
    assert!(count.render().contains("SELECT COUNT(DISTINCT u.id) FROM t_user u"));
}

#[test]
fn derived_delete_is_unaliased() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let delete = setup.method(
        QueryMethod::new("deleteByStatus").parameter(MethodParameter::new("String")),
    );
    assert_eq!(
        delete.render(),
        "<delete id=\"deleteByStatus_String\" parameterType=\"map\">\
         DELETE FROM t_user WHERE (status = #{p1})</delete>"
    );
}

#[test]
fn unsupported_shapes_become_placeholders() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let near = setup.method(
        QueryMethod::new("findByStatusNear").parameter(MethodParameter::new("String")),
    );
    assert!(near.is_placeholder());
    assert!(near.render().starts_with("<!-- findByStatusNear_String: "));

    let joined_delete = setup.method(
        QueryMethod::new("deleteByDepartmentName").parameter(MethodParameter::new("String")),
    );
    assert!(joined_delete.is_placeholder());
}

#[test]
fn fatal_errors_propagate() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let err = setup
        .assembler()
        .query_method(&QueryMethod::new("findByAge"))
        .unwrap_err();
    assert!(err.is_argument_mismatch());

    let err = setup
        .assembler()
        .query_method(&QueryMethod::new("findByNickname").parameter(MethodParameter::new("String")))
        .unwrap_err();
    assert!(matches!(err, CompileError::UnknownProperty { .. }));
}

#[test]
fn dynamic_sort_is_whitelisted() {
    let mut setup = Setup::plain(DatabaseFamily::H2);
    setup.config = setup.config.with_dynamic_sort(true);
    let statement = setup.method(
        QueryMethod::new("findByStatus")
            .parameter(MethodParameter::new("String"))
            .parameter(MethodParameter::sort("Sort")),
    );
    let rendered = statement.render();
    assert!(rendered.contains(
        "<if test=\"p2 != null and !p2.isEmpty()\">ORDER BY <foreach collection=\"p2\" item=\"__order\" separator=\",\">"
    ));
    assert!(!rendered.contains("${"));

    let (sql, _) = preview(
        &statement,
        json!({"p1": "A", "p2": [
            {"property": "name", "direction": "DESC"},
            {"property": "createdAt", "direction": "asc"}
        ]}),
    );
    assert!(sql.ends_with("WHERE (u.status = ?) ORDER BY u.name DESC,u.created_at ASC"));

    let (sql, _) = preview(
        &statement,
        json!({"p1": "A", "p2": [{"property": "1; DROP TABLE t_user", "direction": "DESC"}]}),
    );
    assert!(sql.ends_with("ORDER BY u.id DESC"));

    let (sql, _) = preview(&statement, json!({"p1": "A"}));
    assert!(sql.ends_with("WHERE (u.status = ?)"));
}

#[test]
fn page_sort_follows_static_sort() {
    let mut setup = Setup::plain(DatabaseFamily::Postgres);
    setup.config = setup.config.with_dynamic_sort(true);
    let statement = setup.method(
        QueryMethod::new("findByStatusOrderByAgeDesc")
            .parameter(MethodParameter::new("String"))
            .parameter(MethodParameter::page("Pageable")),
    );
    let (sql, params) = preview(
        &statement,
        json!({"p1": "A", "p2": {"offset": 0, "pageSize": 20, "sort": [{"property": "name", "direction": "ASC"}]}}),
    );
    assert!(sql.ends_with("ORDER BY u.age DESC , u.name ASC LIMIT ? OFFSET ?"));
    assert_eq!(params, vec![json!("A"), json!(20), json!(0)]);
}

#[test]
fn offset_fetch_falls_back_to_a_neutral_order() {
    let mut setup = Setup::plain(DatabaseFamily::SqlServer);
    setup.config = setup.config.with_dynamic_sort(true);
    let statement = setup.method(
        QueryMethod::new("findByStatus")
            .parameter(MethodParameter::new("String"))
            .parameter(MethodParameter::page("Pageable")),
    );
    let (sql, _) = preview(
        &statement,
        json!({"p1": "A", "p2": {"offset": 40, "pageSize": 20}}),
    );
    assert!(sql.ends_with(
        "WHERE (u.status = ?) ORDER BY (SELECT NULL) OFFSET ? ROWS FETCH NEXT ? ROWS ONLY"
    ));
}

#[test]
fn row_number_window_follows_the_static_order() {
    let setup = Setup::plain(DatabaseFamily::SqlServer2005);
    let statement = setup.method(
        QueryMethod::new("findByStatusOrderByNameAsc")
            .parameter(MethodParameter::new("String"))
            .parameter(MethodParameter::page("Pageable")),
    );
    let (sql, params) = preview(
        &statement,
        json!({"p1": "A", "p2": {"offset": 40, "pageSize": 20}}),
    );
    assert!(sql.starts_with(
        "SELECT * FROM ( SELECT TOP (?) ROW_NUMBER() OVER (ORDER BY u.name ASC) AS row_num, u.id"
    ));
    assert!(sql.ends_with(
        "WHERE (u.status = ?) ORDER BY u.name ASC ) row_paged WHERE row_num > ? ORDER BY row_num"
    ));
    assert_eq!(params, vec![json!(60), json!("A"), json!(40)]);
}

#[test]
fn declared_query_with_its_own_order_is_not_filled() {
    let setup = Setup::plain(DatabaseFamily::SqlServer);
    let statement = setup.declared(
        DeclaredQuery::new("active", "SELECT * FROM t_user WHERE active = 1 ORDER BY name")
            .parameter(MethodParameter::page("Pageable")),
    );
    assert_eq!(
        statement.body().unwrap().render(),
        "SELECT * FROM t_user WHERE active = 1 ORDER BY name \
OFFSET #{p1.offset} ROWS FETCH NEXT #{p1.pageSize} ROWS ONLY"
    );

    let nested = setup.declared(
        DeclaredQuery::new(
            "recent",
            "SELECT * FROM (SELECT TOP 10 * FROM t_user ORDER BY id DESC) recent",
        )
        .parameter(MethodParameter::page("Pageable")),
    );
    assert!(nested
        .body()
        .unwrap()
        .render()
        .contains(") recent ORDER BY (SELECT NULL) OFFSET"));
}

#[test]
fn limited_page_shifts_the_offset() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.method(
        QueryMethod::new("findTop5ByStatus")
            .parameter(MethodParameter::new("String"))
            .parameter(MethodParameter::page("Pageable")),
    );
    let (sql, params) = preview(
        &statement,
        json!({"p1": "A", "p2": {"offset": 20, "pageSize": 10}}),
    );
    assert!(sql.ends_with("LIMIT 5 OFFSET ?"));
    assert_eq!(params, vec![json!("A"), json!(15)]);
}

#[test]
fn declared_queries_bind_like_and_in() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.declared(
        DeclaredQuery::new(
            "search",
            "SELECT * FROM t_user WHERE name LIKE %:name% AND status IN :statuses",
        )
        .parameter(MethodParameter::new("String").named("name"))
        .parameter(MethodParameter::new("List<String>").named("statuses")),
    );
    assert_eq!(statement.id(), "search_String_List");
    assert!(matches!(statement.kind, StatementKind::Select { .. }));

    let (sql, params) = preview(&statement, json!({"name": "jo", "statuses": ["A"]}));
    assert_eq!(sql, "SELECT * FROM t_user WHERE name LIKE ? AND status IN (?)");
    assert_eq!(params, vec![json!("%jo%"), json!("A")]);

    let (sql, _) = preview(&statement, json!({"name": "jo", "statuses": []}));
    assert_eq!(sql, "SELECT * FROM t_user WHERE name LIKE ? AND status IN (NULL)");
}

#[test]
fn declared_pageable_select_wraps_the_count() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let statement = setup.declared(
        DeclaredQuery::new("active", "SELECT * FROM t_user WHERE active = TRUE")
            .parameter(MethodParameter::page("Pageable")),
    );
    assert_eq!(
        statement.body().unwrap().render(),
        "SELECT * FROM t_user WHERE active = TRUE LIMIT #{p1.pageSize} OFFSET #{p1.offset}"
    );
    assert_eq!(
        statement.derived[0].body().unwrap().render(),
        "SELECT COUNT(*) FROM ( SELECT * FROM t_user WHERE active = TRUE ) count_inner"
    );

    let explicit = setup.declared(
        DeclaredQuery::new("active", "SELECT * FROM t_user WHERE active = TRUE")
            .parameter(MethodParameter::page("Pageable"))
            .count_query("SELECT COUNT(id) FROM t_user WHERE active = TRUE"),
    );
    assert_eq!(
        explicit.derived[0].body().unwrap().render(),
        "SELECT COUNT(id) FROM t_user WHERE active = TRUE"
    );
}

#[test]
fn declared_query_kinds() {
    let setup = Setup::plain(DatabaseFamily::H2);
    let update = setup.declared(
        DeclaredQuery::new("deactivate", "UPDATE t_user SET active = FALSE WHERE id = ?1")
            .parameter(MethodParameter::new("Long")),
    );
    assert_eq!(
        update.render(),
        "<update id=\"deactivate_Long\" parameterType=\"map\">\
         UPDATE t_user SET active = FALSE WHERE id = #{p1}</update>"
    );

    let call = setup.declared(DeclaredQuery::new("refresh", "CALL refresh_stats()"));
    assert!(call.is_placeholder());

    let forced = setup.declared(
        DeclaredQuery::new("refresh", "CALL refresh_stats()").kind(QueryKind::Update),
    );
    assert_eq!(forced.render(), "<update id=\"refresh\">CALL refresh_stats()</update>");
}

fn ids(statements: &[Statement]) -> Vec<String> {
    statements
        .iter()
        .flat_map(Statement::flatten)
        .map(|s| s.id().to_string())
        .collect()
}

#[test]
fn simple_statements_cover_crud() {
    let setup = Setup::new(fixtures::user(), DatabaseFamily::H2);
    let statements = setup.assembler().simple_statements().unwrap();
    assert_eq!(
        ids(&statements),
        vec![
            "BaseResultMap",
            "Base_Column_List",
            "insert",
            "insertSelective",
            "updateById",
            "updateByIdSelective",
            "deleteById",
            "findById",
            "existsById",
            "findAll",
            "findAll_Sort",
            "findAll_Pageable",
            "findAll_Pageable__count",
            "count",
            "deleteAll",
        ]
    );

    let by_id = |id: &str| statements.iter().find(|s| s.id() == id).unwrap().render();
    assert_eq!(
        by_id("insert"),
        "<insert id=\"insert\" parameterType=\"com.example.User\" useGeneratedKeys=\"true\" \
         keyProperty=\"id\" keyColumn=\"id\">INSERT INTO t_user (name, age, email, active, status, created_at) \
         VALUES (#{name} , #{age} , #{email} , #{active} , #{status} , #{createdAt})</insert>"
    );
    assert_eq!(
        by_id("findById"),
        "<select id=\"findById\" resultMap=\"BaseResultMap\" parameterType=\"map\">\
         SELECT <include refid=\"Base_Column_List\"/> FROM t_user u \
         WHERE u.id = #{id,javaType=java.lang.Long}</select>"
    );
    assert_eq!(
        by_id("deleteAll"),
        "<delete id=\"deleteAll\">DELETE FROM t_user</delete>"
    );
    assert!(by_id("BaseResultMap").starts_with(
        "<resultMap id=\"BaseResultMap\" type=\"com.example.User\">\
         <id property=\"id\" column=\"id\" javaType=\"java.lang.Long\"/>\
         <result property=\"name\" column=\"name\"/>"
    ));
}

#[test]
fn selective_statements_skip_null_properties() {
    let setup = Setup::new(fixtures::user(), DatabaseFamily::H2);
    let statements = setup.assembler().simple_statements().unwrap();
    let find = |id: &str| statements.iter().find(|s| s.id() == id).unwrap();

    let (sql, params) = preview(find("insertSelective"), json!({"name": "jo", "age": 3}));
    assert_eq!(sql, "INSERT INTO t_user ( name, age ) VALUES ( ? , ? )");
    assert_eq!(params, vec![json!("jo"), json!(3)]);

    let (sql, params) = preview(find("updateByIdSelective"), json!({"id": 1, "name": "x"}));
    assert_eq!(sql, "UPDATE t_user SET name = ? WHERE id = ?");
    assert_eq!(params, vec![json!("x"), json!(1)]);
}

#[test]
fn full_insert_and_update_expose_their_placeholders() {
    let setup = Setup::new(fixtures::user(), DatabaseFamily::H2);
    let statements = setup.assembler().simple_statements().unwrap();
    let find = |id: &str| statements.iter().find(|s| s.id() == id).unwrap();
    let fields = ["name", "age", "email", "active", "status", "createdAt"];

    let insert = find("insert").body().unwrap();
    assert_eq!(insert.placeholder_names(), fields);

    let update = find("updateById").body().unwrap().placeholder_names();
    assert_eq!(&update[..fields.len()], fields);
    assert_eq!(update.len(), fields.len() + 1);

    let (sql, params) = preview(
        find("updateById"),
        json!({"id": 9, "name": "jo", "age": 3, "email": null, "active": true, "status": "A", "createdAt": null}),
    );
    assert_eq!(
        sql,
        "UPDATE t_user SET name = ? , age = ? , email = ? , active = ? , status = ? , created_at = ? WHERE id = ?"
    );
    assert_eq!(
        params,
        vec![json!("jo"), json!(3), json!(null), json!(true), json!("A"), json!(null), json!(9)]
    );
}

#[test]
fn find_by_id_previews_with_the_column_list() {
    let setup = Setup::new(fixtures::user(), DatabaseFamily::H2);
    let statements = setup.assembler().simple_statements().unwrap();
    let columns = statements.iter().find(|s| s.id() == COLUMNS_ID).unwrap();
    let find = statements.iter().find(|s| s.id() == "findById").unwrap();

    let preview = Previewer::new()
        .with_include(COLUMNS_ID, columns.body().unwrap().clone())
        .preview(find.body().unwrap(), &json!({"id": 7}))
        .unwrap();
    assert_eq!(
        preview.sql,
        format!("SELECT {USER_COLUMNS} FROM t_user u WHERE u.id = ?")
    );
    assert_eq!(preview.parameters, vec![json!(7)]);
}

#[test]
fn composite_ids_compare_component_wise() {
    let setup = Setup::new(fixtures::order(), DatabaseFamily::H2);
    let statements = setup.assembler().simple_statements().unwrap();
    let render = |id: &str| statements.iter().find(|s| s.id() == id).unwrap().render();

    assert!(render("findById").ends_with(
        "FROM t_order o WHERE o.tenant_id = #{id.tenant} AND o.order_no = #{id.number}</select>"
    ));
    assert_eq!(
        render("updateById"),
        "<update id=\"updateById\" parameterType=\"Order\">UPDATE t_order SET total = #{total} \
         WHERE tenant_id = #{id.tenant} AND order_no = #{id.number}</update>"
    );
    assert!(render("insert").starts_with("<insert id=\"insert\" parameterType=\"Order\">"));
}

#[test]
fn sequence_keys_need_dialect_support() {
    let setup = Setup::new(fixtures::invoice(), DatabaseFamily::Postgres);
    let statements = setup.assembler().simple_statements().unwrap();
    let insert = statements.iter().find(|s| s.id() == "insert").unwrap();
    assert!(insert.render().contains(
        "<selectKey keyProperty=\"id\" order=\"BEFORE\">SELECT nextval('invoice_seq')</selectKey>"
    ));

    let setup = Setup::new(fixtures::invoice(), DatabaseFamily::MySql);
    let statements = setup.assembler().simple_statements().unwrap();
    let insert = statements.iter().find(|s| s.id() == "insert").unwrap();
    assert!(insert.is_placeholder());
}

#[test]
fn database_id_is_opt_in() {
    let mut setup = Setup::plain(DatabaseFamily::Postgres);
    setup.config = setup.config.with_database_id(true);
    let statement = setup.method(QueryMethod::new("countByActiveTrue"));
    assert!(statement.render().contains("databaseId=\"postgresql\""));
}

#[test]
fn query_kind_detection() {
    assert_eq!(QueryKind::detect("select 1"), Some(QueryKind::Select));
    assert_eq!(QueryKind::detect("(SELECT 1) UNION (SELECT 2)"), Some(QueryKind::Select));
    assert_eq!(QueryKind::detect("insert into t values (1)"), Some(QueryKind::Insert));
    assert_eq!(QueryKind::detect("Delete from t"), Some(QueryKind::Delete));
    assert_eq!(QueryKind::detect(""), None);
}
