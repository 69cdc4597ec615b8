use courier_core::message::Command;
use courier_macros::command;

// 已有的 derive 会与默认派生合并去重
#[command(name = "orders.place", output = u64)]
#[derive(Clone, PartialEq)]
struct PlaceOrder {
    sku: String,
    quantity: u32,
}

fn main() {
    let cmd = PlaceOrder {
        sku: "sku-1".to_string(),
        quantity: 2,
    };
    assert_eq!(cmd.clone(), cmd);
    assert_eq!(format!("{cmd:?}"), "PlaceOrder { sku: \"sku-1\", quantity: 2 }");
    assert_eq!(PlaceOrder::NAME, "orders.place");
    let id: <PlaceOrder as Command>::Output = 7;
    assert_eq!(id, 7);
}
