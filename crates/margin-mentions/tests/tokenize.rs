use margin_mentions::{ContentSegment, Member, tokenize};
use pretty_assertions::assert_eq;

fn members() -> Vec<Member> {
    vec![Member::new(1, "User 1"), Member::new(2, "User 2")]
}

#[test]
fn test_mixed_grammars_in_order() {
    let members = members();
    let segments = tokenize(
        "Hello <#1:User 1#> and <#2:User 2#>\nSo little time<@U2>",
        &members,
    );

    assert_eq!(segments.len(), 7);
    assert_eq!(segments[0], ContentSegment::Text("Hello "));
    assert_eq!(segments[2], ContentSegment::Text(" and "));
    assert_eq!(segments[4], ContentSegment::Break);
    assert_eq!(segments[5], ContentSegment::Text("So little time"));

    let resolved: Vec<(usize, u64)> = segments
        .iter()
        .enumerate()
        .filter_map(|(idx, segment)| match segment {
            ContentSegment::Mention(mention) => mention.user.map(|user| (idx, user.id)),
            _ => None,
        })
        .collect();
    assert_eq!(resolved, vec![(1, 1), (3, 2), (6, 2)]);

    let ContentSegment::Mention(first) = &segments[1] else {
        panic!("expected a mention at index 1");
    };
    assert_eq!(first.token, "User 1");
    assert_eq!(first.display(), "User 1");
}

#[test]
fn test_segments_reconstruct_source_with_tokens() {
    let members = members();
    let source = "a <#1:User 1#>\n\n<@U2>b\n<#0:everyone#> end";
    let segments = tokenize(source, &members);

    let rebuilt: String = segments.iter().map(|s| s.source_text()).collect();
    assert_eq!(rebuilt, "a User 1\n\n<@U2>b\neveryone end");

    // No zero-length text segments are ever produced.
    assert!(segments.iter().all(|s| match s {
        ContentSegment::Text(text) => !text.is_empty(),
        _ => true,
    }));
}

#[test]
fn test_tokenize_is_idempotent() {
    let members = members();
    let source = "<@U1><@U2>\n<#2:User 2#>";
    assert_eq!(tokenize(source, &members), tokenize(source, &members));
}

#[test]
fn test_segments_serialize_for_renderers() {
    let members = members();
    let segments = tokenize("hi <@U1>\n", &members);
    let json = serde_json::to_value(&segments).unwrap();

    assert_eq!(json[0]["type"], "text");
    assert_eq!(json[0]["value"], "hi ");
    assert_eq!(json[1]["type"], "mention");
    assert_eq!(json[1]["value"]["user"]["name"], "User 1");
    assert_eq!(json[2]["type"], "break");
}
