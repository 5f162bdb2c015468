mod common;

use chrono::Duration;
use common::*;
use entity_registry::filter::text::encode;
use entity_registry::prelude::*;
use uuid::Uuid;

async fn seed(fx: &Fixture) -> Uuid {
    let mut branch = Branch::named("Central");
    fx.branches.create(&mut branch, &Preload::Default).await.unwrap();
    let branch_id = branch.audit.id;

    let mut banks = vec![
        Bank::new("Alpha", Some(branch_id), 3),
        Bank::new("Beta", Some(branch_id), 7),
        Bank::new("Gamma", None, 7),
        Bank::new("Delta", None, 1),
    ];
    fx.banks.create_many(&mut banks, &Preload::Default).await.unwrap();
    branch_id
}

async fn names(fx: &Fixture, filter: &Filter) -> Vec<String> {
    let mut names: Vec<String> = fx
        .banks
        .find(filter, &Preload::None)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.name)
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_conditions_and_tree_select_the_same_rows() {
    let fx = fixture().await;
    seed(&fx).await;

    let conditions = vec![Condition::ge("rating", 3), Condition::ne("name", "Gamma")];
    let flat = Filter::from(conditions.clone());
    let tree = Filter::Tree(FilterNode::all(conditions));

    assert_eq!(names(&fx, &flat).await, vec!["Alpha", "Beta"]);
    assert_eq!(names(&fx, &flat).await, names(&fx, &tree).await);
    assert_eq!(
        fx.banks.count(&flat).await.unwrap(),
        fx.banks.count(&tree).await.unwrap()
    );
}

#[tokio::test]
async fn test_by_example_matches_only_set_fields() {
    let fx = fixture().await;
    let branch_id = seed(&fx).await;

    let exemplar = Bank {
        branch_id: Some(branch_id),
        rating: 7,
        ..Default::default()
    };
    let filter = Filter::by_example(&exemplar);
    assert_eq!(names(&fx, &filter).await, vec!["Beta"]);

    let equivalent = Filter::from(vec![
        Condition::eq("branch_id", branch_id),
        Condition::eq("rating", 7),
    ]);
    assert_eq!(names(&fx, &filter).await, names(&fx, &equivalent).await);

    // A zero-valued exemplar constrains nothing.
    let everything = Filter::by_example(&Bank::default());
    assert_eq!(fx.banks.count(&everything).await.unwrap(), 4);
}

#[tokio::test]
async fn test_or_and_not_groups() {
    let fx = fixture().await;
    seed(&fx).await;

    let either = Filter::Tree(FilterNode::any([
        Condition::eq("name", "Alpha"),
        Condition::eq("rating", 1),
    ]));
    assert_eq!(names(&fx, &either).await, vec!["Alpha", "Delta"]);

    let neither = Filter::Tree(FilterNode::negate(FilterNode::any([
        Condition::eq("name", "Alpha"),
        Condition::eq("rating", 1),
    ])));
    assert_eq!(names(&fx, &neither).await, vec!["Beta", "Gamma"]);

    let nested = Filter::Tree(FilterNode::And(vec![
        FilterNode::Leaf(Condition::eq("rating", 7)),
        FilterNode::Or(vec![
            FilterNode::Leaf(Condition::is_empty("branch_id")),
            FilterNode::Leaf(Condition::starts_with("name", "be")),
        ]),
    ]));
    assert_eq!(names(&fx, &nested).await, vec!["Beta", "Gamma"]);
}

#[tokio::test]
async fn test_empty_group_matches_everything() {
    let fx = fixture().await;
    seed(&fx).await;

    assert_eq!(fx.banks.count(&Filter::Tree(FilterNode::Or(vec![]))).await.unwrap(), 4);
    assert_eq!(fx.banks.count(&Filter::from(Vec::<Condition>::new())).await.unwrap(), 4);
}

#[tokio::test]
async fn test_text_operators() {
    let fx = fixture().await;
    seed(&fx).await;

    // Equality on text is exact; substring matches ignore case.
    assert!(names(&fx, &Filter::from(Condition::eq("name", "alpha"))).await.is_empty());
    assert_eq!(
        names(&fx, &Filter::from(Condition::contains("name", "ALP"))).await,
        vec!["Alpha"]
    );
    assert_eq!(
        names(&fx, &Filter::from(Condition::ends_with("name", "TA"))).await,
        vec!["Beta", "Delta"]
    );
    assert_eq!(
        names(&fx, &Filter::from(Condition::like("name", "_amma"))).await,
        vec!["Gamma"]
    );
    assert_eq!(
        names(&fx, &Filter::from(Condition::is_in("name", ["Alpha", "Delta", "Nope"]))).await,
        vec!["Alpha", "Delta"]
    );
    assert_eq!(
        names(&fx, &Filter::from(Condition::between("rating", 2, 7))).await,
        vec!["Alpha", "Beta", "Gamma"]
    );
}

#[tokio::test]
async fn test_unknown_or_nested_field_is_rejected() {
    let fx = fixture().await;
    seed(&fx).await;

    for field in ["colour", "branch.name"] {
        let err = fx
            .banks
            .find(&Filter::from(Condition::eq(field, "x")), &Preload::None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "field {}", field);
    }

    let err = fx
        .banks
        .count(&Filter::from(Condition::gt("rating", "not a number")))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn test_encoded_text_matches_structured_filter() {
    let fx = fixture().await;
    seed(&fx).await;

    let json = r#"{"logic":"or","filters":[
        {"field":"name","mode":"equal","value":"Alpha"},
        {"logic":"and","filters":[
            {"field":"rating","mode":"gte","value":7},
            {"not":{"field":"name","mode":"startswith","value":"g"}}
        ]}
    ]}"#;

    let from_json = JsonFilterParser.parse(json).unwrap();
    let from_encoded = EncodedFilterParser.parse(&encode(json)).unwrap();
    assert_eq!(from_json, from_encoded);

    let expected = Filter::Tree(FilterNode::Or(vec![
        FilterNode::Leaf(Condition::eq("name", "Alpha")),
        FilterNode::And(vec![
            FilterNode::Leaf(Condition::ge("rating", 7)),
            FilterNode::negate(FilterNode::Leaf(Condition::starts_with("name", "g"))),
        ]),
    ]));
    assert_eq!(
        names(&fx, &Filter::Tree(from_encoded)).await,
        names(&fx, &expected).await
    );
    assert_eq!(names(&fx, &expected).await, vec!["Alpha", "Beta"]);
}

#[tokio::test]
async fn test_bare_date_selects_the_whole_day() {
    let fx = fixture().await;
    let mut bank = Bank::new("Dated", None, 0);
    fx.banks.create(&mut bank, &Preload::Default).await.unwrap();

    let day = bank.audit.created_at.date_naive();
    let today = day.format("%Y-%m-%d").to_string();
    let tomorrow = (day + Duration::days(1)).format("%Y-%m-%d").to_string();

    let on_day = Filter::from(Condition::eq("created_at", today.as_str()));
    assert_eq!(names(&fx, &on_day).await, vec!["Dated"]);

    let next_day = Filter::from(Condition::eq("created_at", tomorrow.as_str()));
    assert!(names(&fx, &next_day).await.is_empty());

    let before_tomorrow = Filter::from(Condition::lt("created_at", tomorrow.as_str()));
    assert_eq!(fx.banks.count(&before_tomorrow).await.unwrap(), 1);
}

#[tokio::test]
async fn test_soft_deleted_rows_never_match_default_reads() {
    let fx = fixture().await;
    seed(&fx).await;
    let alpha = fx
        .banks
        .find_one(&Filter::from(Condition::eq("name", "Alpha")), &Preload::None)
        .await
        .unwrap();
    fx.banks.delete(alpha.audit.id, None).await.unwrap();

    let filter = Filter::from(Condition::contains("name", "a"));
    assert!(!names(&fx, &filter).await.contains(&"Alpha".to_string()));
    let all = fx
        .banks
        .find_including_deleted(&filter, &Preload::None)
        .await
        .unwrap();
    assert!(all.iter().any(|b| b.name == "Alpha"));
}
