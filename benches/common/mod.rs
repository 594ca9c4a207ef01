#![allow(dead_code)]

pub fn workloads() -> Vec<(&'static str, String)> {
    vec![
        ("statements", statement_heavy(500)),
        ("blocks", block_heavy(120)),
        ("expressions", expression_heavy(80)),
    ]
}

/// Flat assignments and jumps, no block lowering.
fn statement_heavy(count: usize) -> String {
    let mut source = String::new();
    for index in 0..count {
        source.push_str(&format!("v{index} = v{prev} + {index} * 2\n", prev = index / 2));
        if index % 25 == 0 {
            source.push_str(&format!("mark{index}:\n"));
            source.push_str(&format!("jumpif (v{index} > 100) mark{index}\n"));
        }
    }
    source
}

/// Nested if/while/foreach blocks to exercise the lowering pass.
fn block_heavy(count: usize) -> String {
    let mut source = String::new();
    for index in 0..count {
        source.push_str(&format!(
            "foreach item, position in batch{index} do\n\
             if item > limit then\n\
             total = total + item\n\
             else if item < 0 then\n\
             continue\n\
             else then\n\
             break\n\
             endif\n\
             endforeach\n"
        ));
        source.push_str(&format!(
            "while total < goal{index} do\n\
             total = total + step\n\
             endwhile\n"
        ));
    }
    source
}

/// One long expression per statement.
fn expression_heavy(count: usize) -> String {
    let mut source = String::new();
    for index in 0..count {
        source.push_str(&format!("x{index} = {}\n", long_expression(12)));
    }
    source
}

pub fn long_expression(terms: usize) -> String {
    let mut expression = String::from("1 + 2 * 3 ** 4");
    for term in 0..terms {
        expression.push_str(&format!(
            " - f{term}(a, b && c || d) / (e{term} + 5) % 7 <= threshold"
        ));
    }
    expression
}
