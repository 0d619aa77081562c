use super::*;

fn lit(s: &str) -> Fragment {
    Fragment::literal(s)
}

#[test]
fn column_and_table_references() {
    assert_eq!(Fragment::column(Some("u"), "age").unwrap().render(), "u.age");
    assert_eq!(Fragment::column(None, "age").unwrap().render(), "age");
    assert_eq!(Fragment::column(Some(""), "age").unwrap().render(), "age");
    assert_eq!(Fragment::table(Some("public"), "t_user").unwrap().render(), "public.t_user");

    let aliased = TableRef::new(None, "t_user").unwrap().aliased("u");
    assert_eq!(Fragment::Table(aliased).render(), "t_user u");
}

#[test]
fn placeholder_with_type_metadata() {
    let p = Placeholder::new("p1")
        .unwrap()
        .with_java_type(Some("java.lang.String"))
        .with_jdbc_type(Some("VARCHAR"))
        .with_type_handler(None);
    assert_eq!(
        Fragment::from(p).render(),
        "#{p1,javaType=java.lang.String,jdbcType=VARCHAR}"
    );
}

#[test]
fn invalid_construction_is_rejected() {
    assert!(Fragment::column(Some("u"), "").is_err());
    assert!(Fragment::placeholder(" ").is_err());
    assert!(Fragment::placeholder("a}b").is_err());
    assert!(Repeat::new("", "item", vec![]).is_err());
    assert!(Fragment::if_("", vec![lit("x")]).is_err());
    assert!(Fragment::bind("a.b", "x").is_err());
    assert!(Fragment::raw("1 OR 1=1").is_err());
    assert!(Fragment::function("", vec![]).is_err());
}

#[test]
fn composites_skip_empty_children() {
    let g = Fragment::group(vec![lit("SELECT"), Fragment::empty(), lit("1"), lit("")]);
    assert_eq!(g.render(), "SELECT 1");
    assert_eq!(Fragment::group(vec![]).render(), "");
    assert_eq!(Fragment::paren(vec![]).render(), "");
    assert_eq!(Fragment::where_(vec![Fragment::empty()]).render(), "");
    assert!(Fragment::where_(vec![Fragment::empty()]).is_empty());
}

#[test]
fn function_call_joins_args_with_commas() {
    let f = Fragment::function(
        "CONCAT",
        vec![lit("'%'"), Fragment::placeholder("p1").unwrap(), lit("'%'")],
    )
    .unwrap();
    assert_eq!(f.render(), "CONCAT('%', #{p1}, '%')");
}

#[test]
fn dynamic_tags_render_attributes() {
    let cond = Fragment::if_(
        "name != null and age > 18",
        vec![lit("AND"), Fragment::column(Some("u"), "name").unwrap()],
    )
    .unwrap();
    assert_eq!(
        cond.render(),
        "<if test=\"name != null and age &gt; 18\">AND u.name</if>"
    );

    let each = Fragment::foreach(
        Repeat::new("ids", "__item", vec![Fragment::placeholder("__item").unwrap()])
            .unwrap()
            .open("(")
            .close(")")
            .separator(","),
    );
    assert_eq!(
        each.render(),
        "<foreach collection=\"ids\" item=\"__item\" open=\"(\" close=\")\" separator=\",\">#{__item}</foreach>"
    );

    let choose = Fragment::choose("ids == null", lit("(NULL)"), each).unwrap();
    assert!(choose.render().starts_with("<choose><when test=\"ids == null\">(NULL)</when><otherwise><foreach"));
    assert!(choose.render().ends_with("</foreach></otherwise></choose>"));
}

#[test]
fn choose_without_otherwise() {
    let c = Fragment::choose("x", lit("a"), Fragment::empty()).unwrap();
    assert_eq!(c.render(), "<choose><when test=\"x\">a</when></choose>");
}

#[test]
fn trim_where_set_bind_comment_include() {
    let trim = Fragment::trim(
        Trim::new(vec![lit("a,"), lit("b,")])
            .prefix("(")
            .suffix(")")
            .suffix_overrides(","),
    );
    assert_eq!(trim.render(), "<trim prefix=\"(\" suffix=\")\" suffixOverrides=\",\">a, b,</trim>");
    assert_eq!(Fragment::where_(vec![lit("a = 1")]).render(), "<where>a = 1</where>");
    assert_eq!(Fragment::set(vec![lit("a = 1,")]).render(), "<set>a = 1,</set>");
    assert_eq!(
        Fragment::bind("__p1_like", "p1 + '%'").unwrap().render(),
        "<bind name=\"__p1_like\" value=\"p1 + '%'\"/>"
    );
    assert_eq!(Fragment::comment("a -- b").render(), "<!-- a - - b -->");
    assert_eq!(Fragment::comment("a---b").render(), "<!-- a- - -b -->");
    assert_eq!(Fragment::comment("step-").render(), "<!-- step-  -->");
    assert_eq!(Fragment::include("__columns").unwrap().render(), "<include refid=\"__columns\"/>");
    assert_eq!(Fragment::raw("tableSuffix").unwrap().render(), "${tableSuffix}");
}

#[test]
fn literals_are_xml_escaped() {
    assert_eq!(lit("a < b").render(), "a &lt; b");
    assert_eq!(lit("a > b").render(), "a > b");
}

#[test]
fn placeholder_names_are_collected_depth_first() {
    let f = Fragment::group(vec![
        Fragment::placeholder("a").unwrap(),
        Fragment::if_("b != null", vec![Fragment::placeholder("b").unwrap()]).unwrap(),
        Fragment::paren(vec![Fragment::placeholder("c").unwrap()]),
    ]);
    assert_eq!(f.placeholder_names(), vec!["a", "b", "c"]);
}

#[test]
fn identifier_paths() {
    assert!(is_identifier_path("a"));
    assert!(is_identifier_path("a.b_c.d$"));
    assert!(!is_identifier_path(""));
    assert!(!is_identifier_path("a..b"));
    assert!(!is_identifier_path("1a"));
}

#[test]
fn rendering_is_deterministic() {
    let f = Fragment::where_(vec![
        Fragment::if_("a != null", vec![lit("AND a = 1")]).unwrap(),
        Fragment::if_("b != null", vec![lit("AND b = 2")]).unwrap(),
    ]);
    assert_eq!(f.render(), f.clone().render());
}

#[test]
fn markup_is_verbatim() {
    let m = Fragment::markup("  <if test=\"a != null\">AND a = #{a}</if> ");
    assert_eq!(m.render(), "<if test=\"a != null\">AND a = #{a}</if>");
    assert!(Fragment::markup("   ").is_empty());
}

#[test]
fn in_list_guards_empty_collections() {
    assert_eq!(
        in_list("p1").unwrap().render(),
        "<choose><when test=\"p1 == null or p1.isEmpty()\">(NULL)</when><otherwise>\
<foreach collection=\"p1\" item=\"__item\" open=\"(\" close=\")\" separator=\",\">#{__item}</foreach>\
</otherwise></choose>"
    );
}
