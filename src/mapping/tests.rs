// src/mapping/tests.rs

use super::*;

// --- Test Helpers ---

fn pts(coords: &[(f64, f64)]) -> Vec<Point> {
    coords.iter().map(|&(x, y)| Point::new(x, y)).collect()
}

fn rect(x1: f64, y1: f64, x2: f64, y2: f64) -> Shape {
    Shape::Rectangle(BoundingBox::new(x1, y1, x2, y2))
}

/// An L-shaped (concave) hexagon.
fn l_shape() -> Vec<Point> {
    pts(&[
        (0.0, 0.0),
        (10.0, 0.0),
        (10.0, 4.0),
        (4.0, 4.0),
        (4.0, 10.0),
        (0.0, 10.0),
    ])
}

// --- Geometry ---

#[test_log::test]
fn polygon_bounding_box_is_coordinate_wise_min_max() {
    let points = pts(&[(12.5, 40.0), (3.0, 22.0), (30.0, 5.0), (18.0, 60.25)]);
    let poly = Polygon::new(points.clone()).unwrap();
    let b = poly.bounding_box();

    let min_x = points.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_x = points.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    assert_eq!(b, BoundingBox::new(min_x, min_y, max_x, max_y));
    assert_eq!(b, BoundingBox::new(3.0, 5.0, 30.0, 60.25));
}

#[test_log::test]
fn polygon_requires_three_points() {
    assert_eq!(
        Polygon::new(pts(&[(0.0, 0.0), (1.0, 1.0)])).unwrap_err(),
        MappingError::TooFewPoints(2)
    );
}

#[test_log::test]
fn point_in_concave_polygon() {
    let poly = Polygon::new(l_shape()).unwrap();
    assert!(poly.contains(Point::new(2.0, 2.0)));
    assert!(poly.contains(Point::new(8.0, 2.0)));
    assert!(poly.contains(Point::new(2.0, 8.0)));
    // The notch of the L.
    assert!(!poly.contains(Point::new(7.0, 7.0)));
    assert!(!poly.contains(Point::new(-1.0, 5.0)));
    assert!(!poly.contains(Point::new(5.0, 11.0)));
}

#[test_log::test]
fn point_in_polygon_is_invariant_under_rotation() {
    let base = l_shape();
    let queries = pts(&[
        (2.0, 2.0),
        (7.0, 7.0),
        (9.5, 3.5),
        (3.9, 9.9),
        (5.0, 4.0),
        (-3.0, 2.0),
        (11.0, 1.0),
    ]);
    for q in queries {
        let expected = contains_point(&base, q);
        for shift in 1..base.len() {
            let mut rotated = base.clone();
            rotated.rotate_left(shift);
            assert_eq!(
                contains_point(&rotated, q),
                expected,
                "query {:?} rotated by {}",
                q,
                shift
            );
        }
    }
}

#[test_log::test]
fn degenerate_point_lists_are_outside() {
    assert!(!contains_point(&[], Point::new(0.0, 0.0)));
    assert!(!contains_point(
        &pts(&[(0.0, 0.0), (10.0, 10.0)]),
        Point::new(5.0, 5.0)
    ));
}

#[test_log::test]
fn rectangle_containment_is_half_open() {
    let shape = rect(10.0, 10.0, 20.0, 20.0);
    assert!(shape.contains(Point::new(10.0, 10.0)));
    assert!(!shape.contains(Point::new(20.0, 15.0)));
}

#[test_log::test]
fn shape_serializes_with_type_tag() {
    let shape = Shape::Polygon(Polygon::new(pts(&[(0.0, 0.0), (4.0, 0.0), (0.0, 3.0)])).unwrap());
    let json = serde_json::to_value(&shape).unwrap();
    assert_eq!(json["type"], "polygon");
    assert_eq!(json["points"].as_array().unwrap().len(), 3);

    let back: Shape = serde_json::from_value(json).unwrap();
    assert_eq!(back.bounding_box(), BoundingBox::new(0.0, 0.0, 4.0, 3.0));

    let bad = serde_json::json!({ "type": "polygon", "points": [{ "x": 0.0, "y": 0.0 }] });
    assert!(serde_json::from_value::<Shape>(bad).is_err());
}

// --- Store ---

#[test_log::test]
fn add_mapping_rejects_degenerate_shapes() {
    let mut store = MappingStore::new();
    let err = store
        .add_mapping(ImageId(1), 'a', rect(10.0, 10.0, 10.0, 30.0))
        .unwrap_err();
    assert!(matches!(err, MappingError::DegenerateShape { .. }));

    // Collinear polygon: zero-height bounding box.
    let flat = Polygon::new(pts(&[(0.0, 5.0), (5.0, 5.0), (9.0, 5.0)])).unwrap();
    assert!(store
        .add_mapping(ImageId(1), 'b', Shape::Polygon(flat))
        .is_err());
    assert!(store.is_empty());
}

#[test_log::test]
fn ids_increase_with_creation_order() {
    let mut store = MappingStore::new();
    let a = store.add_mapping(ImageId(1), 'a', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    let b = store.add_mapping(ImageId(1), 'b', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    store.remove_mapping(b);
    let c = store.add_mapping(ImageId(1), 'c', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    assert!(a < b && b < c, "ids are never reused");
}

#[test_log::test]
fn update_polygon_point_recomputes_bounding_box() {
    let mut store = MappingStore::new();
    let poly = Polygon::new(pts(&[(10.0, 10.0), (20.0, 10.0), (15.0, 20.0)])).unwrap();
    let id = store.add_mapping(ImageId(1), 'v', Shape::Polygon(poly)).unwrap();

    store.update_polygon_point(id, 2, Point::new(15.0, 45.0)).unwrap();
    let b = store.get(id).unwrap().shape.bounding_box();
    assert_eq!(b, BoundingBox::new(10.0, 10.0, 20.0, 45.0));

    assert_eq!(
        store.update_polygon_point(id, 7, Point::new(0.0, 0.0)),
        Err(MappingError::PointOutOfRange { index: 7, len: 3 })
    );
}

#[test_log::test]
fn update_polygon_point_rolls_back_degenerate_move() {
    let mut store = MappingStore::new();
    let poly = Polygon::new(pts(&[(10.0, 10.0), (20.0, 10.0), (15.0, 20.0)])).unwrap();
    let id = store.add_mapping(ImageId(1), 'v', Shape::Polygon(poly)).unwrap();

    let err = store.update_polygon_point(id, 2, Point::new(15.0, 10.0)).unwrap_err();
    assert!(matches!(err, MappingError::DegenerateShape { .. }));
    assert_eq!(
        store.get(id).unwrap().shape.bounding_box(),
        BoundingBox::new(10.0, 10.0, 20.0, 20.0)
    );
}

#[test_log::test]
fn update_polygon_point_on_rectangle_fails() {
    let mut store = MappingStore::new();
    let id = store.add_mapping(ImageId(1), 'r', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    assert_eq!(
        store.update_polygon_point(id, 0, Point::new(1.0, 1.0)),
        Err(MappingError::NotAPolygon(id))
    );
    assert_eq!(
        store.update_polygon_point(MappingId(99), 0, Point::new(1.0, 1.0)),
        Err(MappingError::UnknownMapping(MappingId(99)))
    );
}

#[test_log::test]
fn removing_an_image_cascades_to_its_mappings() {
    let mut store = MappingStore::new();
    store.add_mapping(ImageId(1), 'a', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    store.add_mapping(ImageId(2), 'b', rect(0.0, 0.0, 5.0, 5.0)).unwrap();
    store.add_mapping(ImageId(1), 'c', rect(5.0, 0.0, 9.0, 5.0)).unwrap();

    assert_eq!(store.mappings_for_image(ImageId(1)).len(), 2);
    assert_eq!(store.remove_image(ImageId(1)), 2);
    assert!(store.mappings_for_image(ImageId(1)).is_empty());
    assert_eq!(store.len(), 1);
}

#[test_log::test]
fn most_recent_mapping_wins_for_a_character() {
    let mut store = MappingStore::new();
    let first = store.add_mapping(ImageId(1), 'A', rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    store.add_mapping(ImageId(1), 'B', rect(20.0, 0.0, 30.0, 10.0)).unwrap();
    let second = store.add_mapping(ImageId(2), 'A', rect(5.0, 5.0, 15.0, 15.0)).unwrap();

    assert_eq!(store.active_mapping_for_char('A').unwrap().id, second);
    let active: Vec<(char, MappingId)> = store
        .active_mappings()
        .iter()
        .map(|e| (e.character, e.id))
        .collect();
    assert_eq!(active.len(), 2);
    assert_eq!(active[0], ('A', second));
    assert_eq!(active[1].0, 'B');

    store.remove_mapping(second);
    assert_eq!(store.active_mapping_for_char('A').unwrap().id, first);
    assert!(store.active_mapping_for_char('Z').is_none());
}

#[test_log::test]
fn hit_test_prefers_newest_overlapping_mapping() {
    let mut store = MappingStore::new();
    store.add_mapping(ImageId(1), 'o', rect(0.0, 0.0, 20.0, 20.0)).unwrap();
    let inner = store.add_mapping(ImageId(1), 'i', rect(5.0, 5.0, 10.0, 10.0)).unwrap();

    assert_eq!(store.hit_test(ImageId(1), Point::new(6.0, 6.0)).unwrap().id, inner);
    assert_eq!(store.hit_test(ImageId(1), Point::new(15.0, 15.0)).unwrap().character, 'o');
    assert!(store.hit_test(ImageId(2), Point::new(6.0, 6.0)).is_none());
}

#[test_log::test]
fn store_round_trips_through_json() {
    let mut store = MappingStore::new();
    store.add_mapping(ImageId(3), 'q', rect(1.0, 2.0, 3.0, 4.0)).unwrap();
    let json = serde_json::to_string(&store).unwrap();
    let mut back: MappingStore = serde_json::from_str(&json).unwrap();
    assert_eq!(back, store);
    let next = back.add_mapping(ImageId(3), 'r', rect(1.0, 2.0, 3.0, 4.0)).unwrap();
    assert_eq!(next, MappingId(1));
}

#[test_log::test]
fn stale_id_counter_on_load_cannot_undercut_existing_ids() {
    let mut store = MappingStore::new();
    for _ in 0..6 {
        store.add_mapping(ImageId(0), 'A', rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    }
    let mut json = serde_json::to_value(&store).unwrap();
    json["next_id"] = serde_json::json!(0);

    let mut loaded: MappingStore = serde_json::from_value(json).unwrap();
    let newer = loaded
        .add_mapping(ImageId(1), 'A', rect(0.0, 0.0, 20.0, 20.0))
        .unwrap();
    assert_eq!(newer, MappingId(6));
    assert_eq!(loaded.active_mapping_for_char('A').unwrap().id, newer);
}

#[test_log::test]
fn missing_id_counter_resumes_after_the_last_entry() {
    let mut store = MappingStore::new();
    store.add_mapping(ImageId(0), 'q', rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    let mut json = serde_json::to_value(&store).unwrap();
    json.as_object_mut().unwrap().remove("next_id");

    let mut loaded: MappingStore = serde_json::from_value(json).unwrap();
    assert_eq!(loaded.len(), 1);
    let id = loaded.add_mapping(ImageId(0), 'r', rect(0.0, 0.0, 10.0, 10.0)).unwrap();
    assert_eq!(id, MappingId(1));
}
