use super::*;
use crate::fragment::in_list;
use pretty_assertions::assert_eq;
use serde_json::json;

fn eval(expr: &str, scope: Value) -> Value {
    SimpleEvaluator.evaluate(expr, &scope).unwrap()
}

#[test]
fn evaluates_paths_and_literals() {
    let scope = json!({"user": {"name": "Jo", "tags": ["a", "b"]}, "n": 3});
    assert_eq!(eval("user.name", scope.clone()), json!("Jo"));
    assert_eq!(eval("user.tags[1]", scope.clone()), json!("b"));
    assert_eq!(eval("user.missing", scope.clone()), Value::Null);
    assert_eq!(eval("'it\\'s'", scope.clone()), json!("it's"));
    assert_eq!(eval("n * 2 + 1", scope.clone()), json!(7));
    assert_eq!(eval("-n", scope), json!(-3));
}

#[test]
fn evaluates_logic_and_comparison() {
    let scope = json!({"a": null, "b": [], "c": 5, "s": "x"});
    assert_eq!(eval("a == null or a.isEmpty()", scope.clone()), json!(true));
    assert_eq!(eval("b == null or b.isEmpty()", scope.clone()), json!(true));
    assert_eq!(eval("c > 3 and c lte 5", scope.clone()), json!(true));
    assert_eq!(eval("!(c != 5)", scope.clone()), json!(true));
    assert_eq!(eval("s == 'x' ? 'yes' : 'no'", scope.clone()), json!("yes"));
    assert_eq!(eval("c > 9 ? 1 : c > 4 ? 2 : 3", scope), json!(2));
}

#[test]
fn evaluates_string_methods() {
    let scope = json!({"p": "50%_off\\"});
    assert_eq!(
        eval(
            r"'%' + p.replace('\\', '\\\\').replace('%', '\\%').replace('_', '\\_') + '%'",
            scope.clone()
        ),
        json!(r"%50\%\_off\\%")
    );
    assert_eq!(eval("p.toUpperCase().startsWith('50')", scope.clone()), json!(true));
    assert_eq!(eval("p.length()", scope), json!(8));
}

#[test]
fn rejects_malformed_expressions() {
    let scope = json!({});
    for bad in ["a ==", "'open", "a.b(", "1 +* 2", "x.frobnicate()", "'a' - 1"] {
        let err = SimpleEvaluator.evaluate(bad, &scope).unwrap_err();
        assert!(matches!(err, CompileError::Expression { .. }), "{bad}: {err:?}");
    }
}

#[test]
fn empty_in_list_previews_as_null_list() {
    let fragment = Fragment::group(vec![
        Fragment::literal("status IN"),
        in_list("statuses").unwrap(),
    ]);
    let previewer = Previewer::new();

    let empty = previewer.preview(&fragment, &json!({"statuses": []})).unwrap();
    assert_eq!(empty.sql, "status IN (NULL)");
    assert!(empty.parameters.is_empty());

    let full = previewer
        .preview(&fragment, &json!({"statuses": ["A", "B"]}))
        .unwrap();
    assert_eq!(full.sql, "status IN (?,?)");
    assert_eq!(full.parameters, vec![json!("A"), json!("B")]);
}

fn assign(column: &str) -> Fragment {
    Fragment::if_(
        format!("{column} != null"),
        vec![
            Fragment::literal(format!("{column} =")),
            Fragment::placeholder(column).unwrap(),
            Fragment::literal(","),
        ],
    )
    .unwrap()
}

#[test]
fn where_and_set_trim_their_bodies() {
    let id = Fragment::if_(
        "id != null",
        vec![Fragment::literal("AND id ="), Fragment::placeholder("id").unwrap()],
    )
    .unwrap();
    let fragment = Fragment::group(vec![
        Fragment::literal("UPDATE t_user"),
        Fragment::set(vec![assign("name"), assign("age")]),
        Fragment::where_(vec![id]),
    ]);
    let preview = Previewer::new()
        .preview(&fragment, &json!({"name": "jo", "id": 7}))
        .unwrap();
    assert_eq!(preview.sql, "UPDATE t_user SET name = ? WHERE id = ?");
    assert_eq!(preview.parameters, vec![json!("jo"), json!(7)]);

    let nothing = Previewer::new().preview(&fragment, &json!({})).unwrap();
    assert_eq!(nothing.sql, "UPDATE t_user");
}

#[test]
fn binds_extend_the_scope() {
    let fragment = Fragment::group(vec![
        Fragment::bind("__name_like", "name + '%'").unwrap(),
        Fragment::literal("name LIKE"),
        Fragment::placeholder("__name_like").unwrap(),
    ]);
    let preview = Previewer::new().preview(&fragment, &json!({"name": "jo"})).unwrap();
    assert_eq!(preview.parameters, vec![json!("jo%")]);
}

#[test]
fn markup_is_parsed_before_resolving() {
    let fragment = Fragment::markup(
        "SELECT * FROM t_user WHERE age &gt; #{age} \
         <if test=\"name != null\">AND name = #{name,jdbcType=VARCHAR}</if> \
         <choose><when test=\"sort == 'age'\">ORDER BY age</when>\
         <when test=\"sort == 'name'\">ORDER BY name</when>\
         <otherwise>ORDER BY id</otherwise></choose>",
    );
    let preview = Previewer::new()
        .preview(&fragment, &json!({"age": 18, "name": "jo", "sort": "name"}))
        .unwrap();
    assert_eq!(
        preview.sql,
        "SELECT * FROM t_user WHERE age > ? AND name = ? ORDER BY name"
    );
    assert_eq!(preview.parameters, vec![json!(18), json!("jo")]);

    let fallback = Previewer::new()
        .preview(&fragment, &json!({"age": 1, "sort": "other"}))
        .unwrap();
    assert_eq!(fallback.sql, "SELECT * FROM t_user WHERE age > ? ORDER BY id");
}

#[test]
fn includes_resolve_registered_fragments() {
    let columns = Fragment::literal("id, name");
    let fragment = Fragment::group(vec![
        Fragment::literal("SELECT"),
        Fragment::include("columns").unwrap(),
        Fragment::literal("FROM t_user"),
    ]);
    let preview = Previewer::new()
        .with_include("columns", columns)
        .preview(&fragment, &json!({}))
        .unwrap();
    assert_eq!(preview.sql, "SELECT id, name FROM t_user");

    let err = Previewer::new().preview(&fragment, &json!({})).unwrap_err();
    assert!(matches!(err, CompileError::InvalidFragment(_)));
}

#[test]
fn scalar_parameters_are_exposed_as_parameter() {
    let fragment = Fragment::group(vec![
        Fragment::literal("id ="),
        Fragment::placeholder("_parameter").unwrap(),
    ]);
    let preview = Previewer::new().preview(&fragment, &json!(42)).unwrap();
    assert_eq!(preview.sql, "id = ?");
    assert_eq!(preview.parameters, vec![json!(42)]);
}

#[test]
fn markup_reads_cdata_references_and_comments() {
    let nodes = parse_markup(
        "SELECT * FROM t_user <!-- paged --> WHERE <![CDATA[age < #{max}]]> \
         AND flags &amp; 4 = 4 <bind name=\"n\" value=\"name + &apos;%&apos;\"/>",
    )
    .unwrap();
    let preview = Previewer::new()
        .preview(&Fragment::group(nodes), &json!({"max": 30, "name": "jo"}))
        .unwrap();
    assert_eq!(preview.sql, "SELECT * FROM t_user WHERE age < ? AND flags & 4 = 4");
    assert_eq!(preview.parameters, vec![json!(30)]);
}

#[test]
fn malformed_markup_is_rejected() {
    for bad in [
        "<if test=\"a\">AND a = 1",
        "<if test=\"a\">AND a = 1</where>",
        "<when test=\"a\">x</when>",
        "<select>x</select>",
        "<if test=\"a>x</if>",
    ] {
        let err = parse_markup(bad).unwrap_err();
        assert!(matches!(err, CompileError::InvalidFragment(_)), "{bad}: {err:?}");
    }
}
