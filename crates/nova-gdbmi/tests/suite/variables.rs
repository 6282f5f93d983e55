use nova_gdbmi::mock::MockCommand;
use nova_gdbmi::{FrameId, MiError, Variable, VariableHandle};

use crate::harness::{loaded, Harness};

/// A stopped program with locals `x` (int), `p` (struct) and `bad` (which the
/// debugger refuses to create an object for).
fn inspect_script(command: &MockCommand) -> Option<Vec<String>> {
    let reply = match command.name() {
        "stack-list-variables" => command.done_with(
            r#"variables=[{name="x",type="int",value="3"},{name="p",type="struct point"},{name="bad",type="int",value="0"}]"#,
        ),
        "var-create" => {
            let words: Vec<&str> = command.command.split_whitespace().collect();
            let name = words.get(5).copied().unwrap_or_default();
            match name {
                "var_1_x" => command.done_with(
                    r#"name="var_1_x",numchild="0",value="3",type="int",thread-id="1",has_more="0""#,
                ),
                "var_1_p" => command.done_with(
                    r#"name="var_1_p",numchild="2",value="{...}",type="struct point",thread-id="1",has_more="0""#,
                ),
                _ => command.error("No symbol \"bad\" in current context."),
            }
        }
        "var-update" if command.command.ends_with("var_1_x") => command.done_with(
            r#"changelist=[{name="var_1_x",value="5",in_scope="true",type_changed="false",has_more="0"}]"#,
        ),
        "var-update" => command.done_with("changelist=[]"),
        "var-list-children" => command.done_with(
            r#"numchild="2",children=[child={name="var_1_p.x",exp="x",numchild="0",value="1",type="int",thread-id="1"},child={name="var_1_p.y",exp="y",numchild="0",value="2",type="int",thread-id="1"}],has_more="0""#,
        ),
        "data-list-register-names" => command.done_with(r#"register-names=["rax","","rip"]"#),
        "data-list-register-values" => command.done_with(
            r#"register-values=[{number="0",value="0x1"},{number="1",value="0x0"},{number="2",value="0x401136 <main+4>"}]"#,
        ),
        "data-evaluate-expression" => command.done_with(r#"value="7""#),
        "var-assign" => command.done_with(r#"value="42""#),
        "var-evaluate-expression" => command.done_with(r#"value="{x = 1, y = 2}""#),
        "thread-info" => command.done_with(
            r#"threads=[{id="1",target-id="Thread 0x7ffff7d8a740 (LWP 9001)",name="app",frame={level="0",addr="0x401136",func="main"},state="stopped"},{id="2",target-id="LWP 9002",state="stopped"}],current-thread-id="1""#,
        ),
        "stack-info-depth" => command.done_with(r#"depth="5""#),
        "stack-list-frames" => command.done_with(
            r#"stack=[frame={level="1",addr="0x401200",func="helper",file="util.c",fullname="/work/util.c",line="20"},frame={level="2",addr="0x7ffff7c29d90",from="/lib/libc.so.6"}]"#,
        ),
        "complete" => command.done_with(r#"matches=["break","break-range"],max_completions_reached="0""#),
        _ => return None,
    };
    Some(vec![reply])
}

async fn stopped_program() -> Harness {
    loaded(inspect_script).await
}

fn by_name<'a>(variables: &'a [Variable], name: &str) -> &'a Variable {
    variables
        .iter()
        .find(|v| v.name == name)
        .unwrap_or_else(|| panic!("no variable {name} in {variables:?}"))
}

#[tokio::test]
async fn scope_handles_are_stable_per_frame() {
    let h = stopped_program().await;

    let first = h.session.scopes(FrameId::pack(1, 0));
    let again = h.session.scopes(FrameId::pack(1, 0));
    let other = h.session.scopes(FrameId::pack(1, 1));

    assert_eq!(first, again);
    assert_eq!(first[0].name, "Locals");
    assert_eq!(first[1].name, "Registers");
    assert_eq!(first[0].handle, VariableHandle::from_raw(1).unwrap());
    assert_ne!(first[0].handle, other[0].handle);
}

#[tokio::test]
async fn locals_are_created_then_refreshed() {
    let h = stopped_program().await;
    let locals = h.session.scopes(FrameId::pack(1, 0))[0].handle;

    let variables = h.session.variables(locals).await.unwrap();
    assert_eq!(variables.len(), 3);

    let x = by_name(&variables, "x");
    assert_eq!(x.value, "3");
    assert_eq!(x.type_name.as_deref(), Some("int"));
    assert_eq!(x.evaluate_name.as_deref(), Some("var_1_x"));
    assert_eq!(x.reference, None);
    assert_eq!(x.memory_reference.as_deref(), Some("3"));

    let p = by_name(&variables, "p");
    assert_eq!(p.value, "{...}");
    let p_handle = p.reference.expect("struct is expandable");

    let bad = by_name(&variables, "bad");
    assert_eq!(bad.value, "<No symbol \"bad\" in current context.>");
    assert_eq!(bad.reference, None);

    let refreshed = h.session.variables(locals).await.unwrap();
    assert_eq!(by_name(&refreshed, "x").value, "5");
    assert_eq!(by_name(&refreshed, "x").type_name.as_deref(), Some("int"));
    assert_eq!(
        by_name(&refreshed, "p").type_name.as_deref(),
        Some("struct point")
    );
    assert_eq!(by_name(&refreshed, "p").reference, Some(p_handle));

    let updates: Vec<String> = h
        .mock
        .commands_named("var-update")
        .into_iter()
        .map(|c| c.command)
        .collect();
    assert_eq!(
        updates,
        vec!["var-update --all-values var_1_x", "var-update --all-values var_1_p"]
    );
    // `bad` is retried on every refresh.
    assert_eq!(h.mock.commands_named("var-create").len(), 4);
    assert_eq!(
        h.mock.commands_named("var-create")[0].command,
        r#"var-create --thread 1 --frame 0 var_1_x @ "x""#
    );
}

#[tokio::test]
async fn lost_variable_objects_are_recreated() {
    let h = loaded(|command: &MockCommand| {
        if command.name() == "var-update" {
            let name = command.command.rsplit(' ').next().unwrap_or_default();
            return Some(vec![command.error(&format!(
                "-var-update: Variable object {name} does not exist"
            ))]);
        }
        inspect_script(command)
    })
    .await;
    let locals = h.session.scopes(FrameId::pack(1, 0))[0].handle;

    let first = h.session.variables(locals).await.unwrap();
    let second = h.session.variables(locals).await.unwrap();
    assert_eq!(
        by_name(&first, "p").reference,
        by_name(&second, "p").reference
    );
    assert_eq!(by_name(&second, "x").value, "3");
    assert_eq!(h.mock.commands_named("var-create").len(), 6);
}

#[tokio::test]
async fn compound_variables_expand_to_children() {
    let h = stopped_program().await;
    let locals = h.session.scopes(FrameId::pack(1, 0))[0].handle;
    let variables = h.session.variables(locals).await.unwrap();
    let p = by_name(&variables, "p").reference.unwrap();

    let children = h.session.variables(p).await.unwrap();
    let names: Vec<&str> = children.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y"]);
    assert_eq!(children[1].value, "2");
    assert_eq!(children[1].evaluate_name.as_deref(), Some("var_1_p.y"));
    assert_eq!(
        h.mock.commands_named("var-list-children")[0].command,
        "var-list-children --all-values var_1_p"
    );
}

#[tokio::test]
async fn register_scope_lists_named_registers() {
    let h = stopped_program().await;
    let registers = h.session.scopes(FrameId::pack(1, 0))[1].handle;

    let first = h.session.variables(registers).await.unwrap();
    let second = h.session.variables(registers).await.unwrap();
    assert_eq!(first, second);
    let names: Vec<(&str, &str)> = first
        .iter()
        .map(|v| (v.name.as_str(), v.value.as_str()))
        .collect();
    assert_eq!(names, vec![("rax", "0x1"), ("rip", "0x401136 <main+4>")]);

    assert_eq!(h.mock.commands_named("data-list-register-names").len(), 1);
    assert_eq!(h.mock.commands_named("data-list-register-values").len(), 2);
}

#[tokio::test]
async fn malformed_register_names_are_a_decode_error() {
    let h = loaded(|command: &MockCommand| {
        (command.name() == "data-list-register-names")
            .then(|| vec![command.done_with(r#"register-names="oops""#)])
    })
    .await;
    assert!(matches!(
        h.session.registers().await,
        Err(MiError::Decode { .. })
    ));
}

#[tokio::test]
async fn unknown_handle_has_no_variables() {
    let h = stopped_program().await;
    let unknown = VariableHandle::from_raw(999).unwrap();
    assert!(h.session.variables(unknown).await.unwrap().is_empty());
}

#[tokio::test]
async fn evaluation_and_variable_object_passthroughs() {
    let h = stopped_program().await;

    assert_eq!(h.session.evaluate("a+b", 1, 0).await.unwrap(), "7");
    assert_eq!(h.session.evaluate("a+b", 0, 0).await.unwrap(), "7");
    assert_eq!(h.session.var_assign("var_1_x", "42").await.unwrap(), "42");
    assert_eq!(
        h.session.var_evaluate_expression("var_1_p").await.unwrap(),
        "{x = 1, y = 2}"
    );

    let texts: Vec<String> = h.mock.commands()[5..]
        .iter()
        .map(|c| c.command.clone())
        .collect();
    assert_eq!(
        texts,
        vec![
            "data-evaluate-expression --thread 1 --frame 0 a+b",
            "data-evaluate-expression a+b",
            "var-assign var_1_x 42",
            "var-evaluate-expression var_1_p",
        ]
    );
}

#[tokio::test]
async fn threads_and_stack() {
    let h = stopped_program().await;

    let threads = h.session.threads().await.unwrap();
    assert_eq!(threads.len(), 2);
    assert_eq!(threads[0].display_name(), "app [9001]");
    assert_eq!(threads[1].display_name(), "LWP 9002");

    let frames = h.session.stack(1, 2, 1).await.unwrap();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0].function, "helper");
    assert_eq!(frames[0].file.as_deref(), Some("/work/util.c"));
    assert_eq!(frames[0].line, 20);
    assert_eq!(frames[1].function, "/lib/libc.so.6");
    assert_eq!(frames[1].file, None);

    h.session.stack(4, 0, 0).await.unwrap();
    assert!(h.session.stack(5, 3, 0).await.unwrap().is_empty());

    let listed: Vec<String> = h
        .mock
        .commands_named("stack-list-frames")
        .into_iter()
        .map(|c| c.command)
        .collect();
    assert_eq!(
        listed,
        vec!["stack-list-frames --thread 1 1 2", "stack-list-frames 4 4"]
    );
    assert_eq!(
        h.mock.commands_named("stack-info-depth")[0].command,
        "stack-info-depth --thread 1"
    );
}

#[tokio::test]
async fn running_thread_has_no_thread_list() {
    let h = loaded(|command: &MockCommand| {
        (command.name() == "thread-info").then(|| vec![command.error("Selected thread is running.")])
    })
    .await;
    assert!(h.session.threads().await.unwrap().is_empty());
}

#[tokio::test]
async fn completions() {
    let h = stopped_program().await;
    assert_eq!(
        h.session.completions("br").await.unwrap(),
        vec!["break", "break-range"]
    );
    assert_eq!(h.mock.commands_named("complete")[0].command, r#"complete "br""#);

    let h = loaded(|command: &MockCommand| {
        (command.name() == "complete").then(|| vec![command.error("Undefined command")])
    })
    .await;
    assert!(matches!(
        h.session.completions("zz").await,
        Err(MiError::Command { .. })
    ));
}
