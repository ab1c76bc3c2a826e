// Integration tests for cell storage, aggregation and splash writes

use cubist::core::CellValue;
use cubist::elements::ElementKind;
use cubist::engine::SplashMode;
use cubist::server::Server;

struct Fixture {
    server: Server,
    db: cubist::DatabaseId,
    x: cubist::DimensionId,
    y: cubist::DimensionId,
    x1: cubist::ElementId,
    x2: cubist::ElementId,
    y1: cubist::ElementId,
    y2: cubist::ElementId,
    cube: cubist::CubeId,
}

fn fixture() -> Fixture {
    let mut server = Server::new().unwrap();
    let db = server.add_database("Test", None).unwrap();
    let x = server.create_dimension(db, "X", None, false).unwrap();
    let y = server.create_dimension(db, "Y", None, false).unwrap();
    let x1 = server.add_element(db, x, "x1", ElementKind::Numeric, None).unwrap();
    let x2 = server.add_element(db, x, "x2", ElementKind::Numeric, None).unwrap();
    let y1 = server.add_element(db, y, "y1", ElementKind::Numeric, None).unwrap();
    let y2 = server.add_element(db, y, "y2", ElementKind::Numeric, None).unwrap();
    let cube = server.create_cube(db, "C", vec![x, y], None, false).unwrap();

    Fixture {
        server,
        db,
        x,
        y,
        x1,
        x2,
        y1,
        y2,
        cube,
    }
}

fn set(f: &mut Fixture, coord: &[u32], value: f64) {
    f.server
        .set_cell(
            f.db,
            f.cube,
            coord,
            CellValue::Numeric(value),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();
}

fn get(f: &Fixture, coord: &[u32]) -> cubist::CellResult {
    f.server.get_cell_value(f.db, f.cube, coord, None).unwrap()
}

#[test]
fn test_write_then_read_base_cell() {
    let mut f = fixture();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 5.0);

    let hit = get(&f, &[f.x1, f.y1]);
    assert_eq!(hit.value, CellValue::Numeric(5.0));
    assert!(hit.found);

    let miss = get(&f, &[f.x2, f.y2]);
    assert_eq!(miss.value, CellValue::Numeric(0.0));
    assert!(!miss.found);
}

#[test]
fn test_consolidated_read_aggregates_weights() {
    let mut f = fixture();
    let xs = f
        .server
        .add_element(f.db, f.x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, xs, &[(f.x1, 1.0), (f.x2, 2.0)], None)
        .unwrap();

    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 5.0);
    let coord = [f.x2, f.y1];
    set(&mut f, &coord, 3.0);

    let sum = get(&f, &[xs, f.y1]);
    assert_eq!(sum.value, CellValue::Numeric(11.0));
    assert!(sum.found);

    // the consolidation cache must follow further base writes
    let coord = [f.x2, f.y1];
    set(&mut f, &coord, 4.0);
    assert_eq!(get(&f, &[xs, f.y1]).value, CellValue::Numeric(13.0));
}

#[test]
fn test_splash_set_base_conserves_aggregate() {
    let mut f = fixture();
    let xs = f
        .server
        .add_element(f.db, f.x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, xs, &[(f.x1, 1.0), (f.x2, 2.0)], None)
        .unwrap();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 5.0);
    let coord = [f.x2, f.y1];
    set(&mut f, &coord, 3.0);

    f.server
        .set_cell(
            f.db,
            f.cube,
            &[xs, f.y1],
            CellValue::Numeric(22.0),
            SplashMode::SetBase,
            false,
            None,
            None,
        )
        .unwrap();

    let total = get(&f, &[xs, f.y1]).value;
    assert_eq!(total, CellValue::Numeric(22.0));

    let v1 = match get(&f, &[f.x1, f.y1]).value {
        CellValue::Numeric(v) => v,
        other => panic!("unexpected value {:?}", other),
    };
    let v2 = match get(&f, &[f.x2, f.y1]).value {
        CellValue::Numeric(v) => v,
        other => panic!("unexpected value {:?}", other),
    };
    assert!((v1 + 2.0 * v2 - 22.0).abs() < 1e-9);
}

#[test]
fn test_splash_set_base_distributes_over_empty_area() {
    let mut f = fixture();
    let xs = f
        .server
        .add_element(f.db, f.x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, xs, &[(f.x1, 1.0), (f.x2, 1.0)], None)
        .unwrap();

    f.server
        .set_cell(
            f.db,
            f.cube,
            &[xs, f.y1],
            CellValue::Numeric(10.0),
            SplashMode::SetBase,
            false,
            None,
            None,
        )
        .unwrap();

    assert_eq!(get(&f, &[xs, f.y1]).value, CellValue::Numeric(10.0));
    assert_eq!(get(&f, &[f.x1, f.y1]).value, CellValue::Numeric(5.0));
}

#[test]
fn test_splash_disabled_rejects_consolidated_path() {
    let mut f = fixture();
    let xs = f
        .server
        .add_element(f.db, f.x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, xs, &[(f.x1, 1.0)], None)
        .unwrap();

    let outcome = f.server.set_cell(
        f.db,
        f.cube,
        &[xs, f.y1],
        CellValue::Numeric(1.0),
        SplashMode::Disabled,
        false,
        None,
        None,
    );
    assert!(matches!(
        outcome,
        Err(cubist::OlapError::InvalidSplashMode(_))
    ));
}

#[test]
fn test_add_base_fills_only_empty_cells() {
    let mut f = fixture();
    let xs = f
        .server
        .add_element(f.db, f.x, "xs", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, xs, &[(f.x1, 1.0), (f.x2, 1.0)], None)
        .unwrap();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 7.0);

    f.server
        .set_cell(
            f.db,
            f.cube,
            &[xs, f.y1],
            CellValue::Numeric(4.0),
            SplashMode::AddBase,
            false,
            None,
            None,
        )
        .unwrap();

    // the filled cell is untouched, the empty one gets its even share
    assert_eq!(get(&f, &[f.x1, f.y1]).value, CellValue::Numeric(7.0));
    assert_eq!(get(&f, &[f.x2, f.y1]).value, CellValue::Numeric(2.0));
}

#[test]
fn test_path_type_enforcement() {
    let mut f = fixture();
    let label = f
        .server
        .add_element(f.db, f.x, "label", ElementKind::Text, None)
        .unwrap();

    // numeric value at a string path
    let outcome = f.server.set_cell(
        f.db,
        f.cube,
        &[label, f.y1],
        CellValue::Numeric(1.0),
        SplashMode::Default,
        false,
        None,
        None,
    );
    assert!(matches!(outcome, Err(cubist::OlapError::InvalidPathType(_))));

    // string value at a string path works
    f.server
        .set_cell(
            f.db,
            f.cube,
            &[label, f.y1],
            CellValue::Text("note".to_string()),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();
    assert_eq!(
        get(&f, &[label, f.y1]).value,
        CellValue::Text("note".to_string())
    );

    // string value at a numeric path
    let outcome = f.server.set_cell(
        f.db,
        f.cube,
        &[f.x1, f.y1],
        CellValue::Text("nope".to_string()),
        SplashMode::Default,
        false,
        None,
        None,
    );
    assert!(matches!(outcome, Err(cubist::OlapError::InvalidPathType(_))));
}

#[test]
fn test_clear_cell_restores_default() {
    let mut f = fixture();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 9.0);

    f.server
        .clear_cell(f.db, f.cube, &[f.x1, f.y1], None, None)
        .unwrap();

    let result = get(&f, &[f.x1, f.y1]);
    assert_eq!(result.value, CellValue::Numeric(0.0));
    assert!(!result.found);
}

#[test]
fn test_bulk_read_order_and_skip_empty() {
    let mut f = fixture();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 1.0);
    let coord = [f.x2, f.y2];
    set(&mut f, &coord, 2.0);

    let area = f
        .server
        .resolve_area(f.db, f.cube, &[None, None], false)
        .unwrap();

    let all = f
        .server
        .get_area_values(f.db, f.cube, &area, false, None)
        .unwrap();
    assert_eq!(all.len(), 4);
    // lexicographic product order over the position-ordered lists
    assert_eq!(all[0].0, vec![f.x1, f.y1]);
    assert_eq!(all[1].0, vec![f.x1, f.y2]);
    assert_eq!(all[2].0, vec![f.x2, f.y1]);
    assert_eq!(all[3].0, vec![f.x2, f.y2]);

    let filled = f
        .server
        .get_area_values(f.db, f.cube, &area, true, None)
        .unwrap();
    assert_eq!(filled.len(), 2);
}

#[test]
fn test_clear_area() {
    let mut f = fixture();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 1.0);
    let coord = [f.x1, f.y2];
    set(&mut f, &coord, 2.0);
    let coord = [f.x2, f.y1];
    set(&mut f, &coord, 3.0);

    let cleared = f
        .server
        .clear_area(f.db, f.cube, &[Some(vec![f.x1]), None], None, None)
        .unwrap();
    assert_eq!(cleared, 2);
    assert!(!get(&f, &[f.x1, f.y1]).found);
    assert!(get(&f, &[f.x2, f.y1]).found);
}

#[test]
fn test_clear_area_on_configuration_cube_spares_protected_cells() {
    use cubist::server::names;

    let mut f = fixture();
    let (config_dim, config_cube) = {
        let db = f.server.database(f.db).unwrap();
        (
            db.find_dimension_by_name(names::CONFIGURATION_DIMENSION).unwrap().id,
            db.find_cube_by_name(names::CONFIGURATION_CUBE).unwrap().id,
        )
    };
    let theme = f
        .server
        .add_element(f.db, config_dim, "Theme", ElementKind::Text, None)
        .unwrap();
    f.server
        .set_cell(
            f.db,
            config_cube,
            &[theme],
            CellValue::Text("dark".to_string()),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();

    // an area without the protected cells clears normally
    let cleared = f
        .server
        .clear_area(f.db, config_cube, &[Some(vec![theme])], None, None)
        .unwrap();
    assert_eq!(cleared, 1);

    // an area touching ClientCache or HideElements is vetoed as a whole
    f.server
        .set_cell(
            f.db,
            config_cube,
            &[theme],
            CellValue::Text("dark".to_string()),
            SplashMode::Default,
            false,
            None,
            None,
        )
        .unwrap();
    let outcome = f.server.clear_area(f.db, config_cube, &[None], None, None);
    assert!(matches!(outcome, Err(cubist::OlapError::NotAuthorized(_))));
    // the vetoed call cleared nothing
    assert!(f
        .server
        .get_cell_value(f.db, config_cube, &[theme], None)
        .unwrap()
        .found);

    // the protected cell itself cannot be cleared directly either
    let client_cache = {
        let db = f.server.database(f.db).unwrap();
        db.dimension(config_dim)
            .unwrap()
            .find_element_by_name(names::CLIENT_CACHE_ELEMENT)
            .unwrap()
            .id
    };
    assert!(matches!(
        f.server.clear_cell(f.db, config_cube, &[client_cache], None, None),
        Err(cubist::OlapError::NotAuthorized(_))
    ));
}

#[test]
fn test_element_delete_purges_cells() {
    let mut f = fixture();
    let coord = [f.x1, f.y1];
    set(&mut f, &coord, 5.0);
    let coord = [f.x2, f.y1];
    set(&mut f, &coord, 6.0);

    f.server.delete_element(f.db, f.x, f.x1, None).unwrap();

    assert!(matches!(
        f.server.get_cell_value(f.db, f.cube, &[f.x1, f.y1], None),
        Err(cubist::OlapError::ElementNotFound(_))
    ));
    assert!(get(&f, &[f.x2, f.y1]).found);
}

#[test]
fn test_consolidation_with_string_children_is_string_path() {
    let mut f = fixture();
    let label = f
        .server
        .add_element(f.db, f.x, "label", ElementKind::Text, None)
        .unwrap();
    let mixed = f
        .server
        .add_element(f.db, f.x, "mixed", ElementKind::Consolidated, None)
        .unwrap();
    f.server
        .add_children(f.db, f.x, mixed, &[(f.x1, 1.0), (label, 1.0)], None)
        .unwrap();

    // a string consolidation never aggregates: it reads the stored value
    // at the exact coordinate
    let result = get(&f, &[mixed, f.y1]);
    assert_eq!(result.value, CellValue::Text(String::new()));
    assert!(!result.found);
}
