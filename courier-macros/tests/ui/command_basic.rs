use courier_core::message::Command;
use courier_macros::command;

#[command(output = Vec<u64>)]
struct ListOrders {
    customer: String,
}

#[command]
struct Ping;

fn main() {
    let cmd = ListOrders {
        customer: "c-1".to_string(),
    };
    let copy = cmd.clone();
    assert_eq!(copy.customer, "c-1");
    assert_eq!(ListOrders::NAME, "ListOrders");
    assert_eq!(Ping::NAME, "Ping");

    let output: <ListOrders as Command>::Output = vec![1, 2];
    assert_eq!(output.len(), 2);
    let _: <Ping as Command>::Output = ();
}
