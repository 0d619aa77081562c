use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table, presets::UTF8_FULL};
use mapperc::DatabaseFamily;

pub fn run() {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            ["Dialect", "databaseId", "Pagination", "Offset first", "Sequences", "Identity"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );

    for family in DatabaseFamily::ALL {
        let dialect = family.dialect();
        table.add_row(vec![
            Cell::new(family.name()).fg(Color::Yellow),
            Cell::new(family.database_id().unwrap_or("-")),
            Cell::new(dialect.pagination().name()),
            yes_no(dialect.pagination().reverses_binding_order()),
            yes_no(dialect.sequence_next_value("seq").is_some()),
            yes_no(dialect.identity_supported()),
        ]);
    }

    println!("{table}");
}

fn yes_no(supported: bool) -> Cell {
    if supported {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no").fg(Color::DarkGrey)
    }
}
