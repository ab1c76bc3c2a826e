// Integration tests for rule evaluation and marker propagation

use cubist::core::CellValue;
use cubist::elements::ElementKind;
use cubist::engine::SplashMode;
use cubist::server::Server;

struct Fixture {
    server: Server,
    db: u32,
    x1: u32,
    x2: u32,
    y1: u32,
    sales: u32,
    prices: u32,
}

fn fixture() -> Fixture {
    let mut server = Server::new().unwrap();
    let db = server.add_database("Test", None).unwrap();
    let x = server.create_dimension(db, "X", None, false).unwrap();
    let y = server.create_dimension(db, "Y", None, false).unwrap();
    let x1 = server.add_element(db, x, "x1", ElementKind::Numeric, None).unwrap();
    let x2 = server.add_element(db, x, "x2", ElementKind::Numeric, None).unwrap();
    let y1 = server.add_element(db, y, "y1", ElementKind::Numeric, None).unwrap();
    let sales = server.create_cube(db, "Sales", vec![x, y], None, false).unwrap();
    let prices = server.create_cube(db, "Prices", vec![x], None, false).unwrap();

    Fixture {
        server,
        db,
        x1,
        x2,
        y1,
        sales,
        prices,
    }
}

fn set(f: &mut Fixture, cube: u32, coord: &[u32], value: f64) {
    f.server
        .set_cell(
            f.db,
            cube,
            coord,
            CellValue::Numeric(value),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();
}

#[test]
fn test_rule_synthesizes_cell_value() {
    let mut f = fixture();
    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, 10.0);

    let rule = f
        .server
        .create_rule(f.db, f.sales, "['x2', *] = ['x1', *] * 2", None, "derived", None)
        .unwrap();

    let result = f
        .server
        .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
        .unwrap();
    assert_eq!(result.value, CellValue::Numeric(20.0));
    assert!(result.found);
    assert_eq!(result.rule, Some(rule));

    // the underlying store never saw the synthesized value
    assert!(f
        .server
        .database(f.db)
        .unwrap()
        .cube(f.sales)
        .unwrap()
        .stored_value(&[f.x2, f.y1])
        .is_none());
}

#[test]
fn test_rule_deactivation_restores_raw_reads() {
    let mut f = fixture();
    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, 10.0);
    let rule = f
        .server
        .create_rule(f.db, f.sales, "['x2', *] = ['x1', *] * 2", None, "", None)
        .unwrap();

    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(20.0)
    );

    f.server
        .set_rule_active(f.db, f.sales, rule, false, None)
        .unwrap();
    let raw = f
        .server
        .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
        .unwrap();
    assert_eq!(raw.value, CellValue::Numeric(0.0));
    assert!(!raw.found);

    f.server
        .set_rule_active(f.db, f.sales, rule, true, None)
        .unwrap();
    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(20.0)
    );
}

#[test]
fn test_cross_cube_marker_invalidation() {
    let mut f = fixture();
    let cube = f.prices;
    let coord = [f.x1];
    set(&mut f, cube, &coord, 10.0);

    f.server
        .create_rule(
            f.db,
            f.sales,
            "[*, 'y1'] = ['Prices' : *] + 1",
            None,
            "price passthrough",
            None,
        )
        .unwrap();

    // the source cube carries the derived marker
    assert_eq!(
        f.server
            .database(f.db)
            .unwrap()
            .cube(f.prices)
            .unwrap()
            .markers
            .len(),
        1
    );

    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x1, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(11.0)
    );

    // a source-cube write must invalidate the memoized rule value
    let cube = f.prices;
    let coord = [f.x1];
    set(&mut f, cube, &coord, 20.0);
    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x1, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(21.0)
    );
}

#[test]
fn test_rule_deletion_removes_markers() {
    let mut f = fixture();
    let rule = f
        .server
        .create_rule(f.db, f.sales, "[*, 'y1'] = ['Prices' : *] + 1", None, "", None)
        .unwrap();
    assert!(!f
        .server
        .database(f.db)
        .unwrap()
        .cube(f.prices)
        .unwrap()
        .markers
        .is_empty());

    f.server.delete_rule(f.db, f.sales, rule, None).unwrap();
    assert!(f
        .server
        .database(f.db)
        .unwrap()
        .cube(f.prices)
        .unwrap()
        .markers
        .is_empty());
    assert!(matches!(
        f.server.delete_rule(f.db, f.sales, rule, None),
        Err(cubist::OlapError::RuleNotFound(_))
    ));
}

#[test]
fn test_rule_cycle_falls_back_to_stored_value() {
    let mut f = fixture();
    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, 5.0);

    // the rule references its own target cell; the re-entry reads the
    // stored value instead of recursing forever
    f.server
        .create_rule(f.db, f.sales, "['x1', 'y1'] = ['x1', 'y1'] + 1", None, "", None)
        .unwrap();

    let result = f
        .server
        .get_cell_value(f.db, f.sales, &[f.x1, f.y1], None)
        .unwrap();
    assert_eq!(result.value, CellValue::Numeric(6.0));
}

#[test]
fn test_rule_over_consolidation() {
    let mut f = fixture();
    let x = f.server.database(f.db).unwrap().find_dimension_by_name("X").unwrap().id;
    let xs = f
        .server
        .add_element(f.db, x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, x, xs, &[(f.x1, 1.0), (f.x2, 1.0)], None)
        .unwrap();
    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, 2.0);
    let cube = f.sales;
    let coord = [f.x2, f.y1];
    set(&mut f, cube, &coord, 3.0);

    // rules win over aggregation
    f.server
        .create_rule(f.db, f.sales, "['xs', *] = 42", None, "", None)
        .unwrap();
    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[xs, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(42.0)
    );
}

#[test]
fn test_rule_functions() {
    let mut f = fixture();
    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, -3.0);

    f.server
        .create_rule(
            f.db,
            f.sales,
            "['x2', *] = if(['x1', *] < 0, abs(['x1', *]), max(['x1', *], 10))",
            None,
            "",
            None,
        )
        .unwrap();

    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(3.0)
    );

    let cube = f.sales;
    let coord = [f.x1, f.y1];
    set(&mut f, cube, &coord, 4.0);
    assert_eq!(
        f.server
            .get_cell_value(f.db, f.sales, &[f.x2, f.y1], None)
            .unwrap()
            .value,
        CellValue::Numeric(10.0)
    );
}

#[test]
fn test_rule_syntax_errors() {
    let mut f = fixture();
    assert!(matches!(
        f.server.create_rule(f.db, f.sales, "['x1'] = 1", None, "", None),
        Err(cubist::OlapError::RuleSyntaxError(_))
    ));
    assert!(matches!(
        f.server
            .create_rule(f.db, f.sales, "['nope', *] = 1", None, "", None),
        Err(cubist::OlapError::ElementNotFound(_))
    ));
    assert!(matches!(
        f.server
            .create_rule(f.db, f.sales, "[*, *] = frobnicate(1)", None, "", None),
        Err(cubist::OlapError::RuleSyntaxError(_))
    ));
}
