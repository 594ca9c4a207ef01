//! Statement parser: splits source into effective lines, dispatches each
//! line against an ordered set of patterns, and lowers block constructs
//! (function, if/else, while, foreach) into flat label/jump sequences.

use regex::Captures;

use crate::error::{ParseResult, ParserError};
use crate::expression;
use crate::model::{
    BinaryOperator, ExprStatement, Expression, FunctionStatement, JumpStatement, ReturnStatement,
    Script, Statement, UnaryOperator,
};

/// Parse a script from a single source blob, reporting line numbers from 1.
pub fn parse_script(source: &str) -> ParseResult<Script> {
    parse_script_parts(&[source], 1)
}

/// Parse a script from an ordered sequence of source blobs. Each blob is
/// split into lines separately; line indices run across all blobs and
/// `start_line_number` is added when reporting errors.
pub fn parse_script_parts(parts: &[&str], start_line_number: usize) -> ParseResult<Script> {
    let mut parser = ScriptParser::new(start_line_number);
    let mut pending: Option<Continuation> = None;
    let mut line_index = 0;
    for part in parts {
        for raw_line in part.split('\n') {
            let raw_line = raw_line.strip_suffix('\r').unwrap_or(raw_line);
            parser.handle_line(raw_line, line_index, &mut pending)?;
            line_index += 1;
        }
    }
    // A continuation chain still open at end-of-input dispatches as-is.
    if let Some(continuation) = pending.take() {
        parser.dispatch(&continuation.text, continuation.start_index)?;
    }
    parser.finish()
}

/// Accumulated backslash-continued line, reported at its first physical line.
struct Continuation {
    text: String,
    start_index: usize,
}

struct FunctionDef {
    name: String,
    args: Vec<String>,
    is_async: bool,
    statements: Vec<Statement>,
}

/// Where an if-then context's guard jump lives, so `endif` can retarget it.
/// The slot survives `endfunction` moving a function body into the script.
enum JumpSlot {
    TopLevel(usize),
    OpenFunction(usize),
    ClosedFunction { function: usize, statement: usize },
}

struct IfThenContext {
    jump: JumpSlot,
    jump_label: String,
    done: String,
    has_else: bool,
    line: String,
    line_number: usize,
}

struct WhileContext {
    loop_label: String,
    done: String,
    expr: Expression,
    line: String,
    line_number: usize,
}

struct ForeachContext {
    loop_label: String,
    continue_label: String,
    done: String,
    index: String,
    length: String,
    has_continue: bool,
    line: String,
    line_number: usize,
}

enum BlockContext {
    IfThen(IfThenContext),
    While(WhileContext),
    Foreach(ForeachContext),
}

struct ScriptParser {
    statements: Vec<Statement>,
    function_def: Option<FunctionDef>,
    block_stack: Vec<BlockContext>,
    label_index: usize,
    start_line_number: usize,
}

impl ScriptParser {
    fn new(start_line_number: usize) -> ScriptParser {
        ScriptParser {
            statements: Vec::new(),
            function_def: None,
            block_stack: Vec::new(),
            label_index: 0,
            start_line_number,
        }
    }

    fn handle_line(
        &mut self,
        raw_line: &str,
        line_index: usize,
        pending: &mut Option<Continuation>,
    ) -> ParseResult<()> {
        if let Some(captures) = regex!(r"^(.*)\\\s*$").captures(raw_line) {
            let fragment = capture(&captures, 1).as_str();
            match pending {
                Some(continuation) => {
                    continuation.text.push(' ');
                    continuation.text.push_str(fragment.trim());
                }
                None => {
                    *pending = Some(Continuation {
                        text: fragment.trim_end().to_string(),
                        start_index: line_index,
                    });
                }
            }
            return Ok(());
        }
        if let Some(continuation) = pending.take() {
            let mut text = continuation.text;
            text.push(' ');
            text.push_str(raw_line.trim());
            return self.dispatch(&text, continuation.start_index);
        }
        self.dispatch(raw_line, line_index)
    }

    /// Dispatch one effective line. First matching pattern wins.
    fn dispatch(&mut self, line: &str, line_index: usize) -> ParseResult<()> {
        // Comment / blank
        if regex!(r"^\s*(#.*)?$").is_match(line) {
            return Ok(());
        }

        // Assignment
        if let Some(captures) = regex!(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*=\s*(.+)$").captures(line)
        {
            let name = capture(&captures, 1).as_str().to_string();
            let expr_match = capture(&captures, 2);
            let expr =
                self.parse_embedded(expr_match.as_str(), line, line_index, expr_match.start())?;
            self.emit(Statement::Expr(ExprStatement {
                name: Some(name),
                expr,
            }));
            return Ok(());
        }

        // Function definition begin
        if let Some(captures) = regex!(
            r"^\s*(async\s+)?function\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(\s*([A-Za-z_][A-Za-z0-9_]*(?:\s*,\s*[A-Za-z_][A-Za-z0-9_]*)*)?\s*\)\s*$"
        )
        .captures(line)
        {
            if self.function_def.is_some() {
                return Err(self.error("Nested function definition", line, line_index));
            }
            let args = captures
                .get(3)
                .map(|group| {
                    group
                        .as_str()
                        .split(',')
                        .map(|arg| arg.trim().to_string())
                        .collect()
                })
                .unwrap_or_default();
            self.function_def = Some(FunctionDef {
                name: capture(&captures, 2).as_str().to_string(),
                args,
                is_async: captures.get(1).is_some(),
                statements: Vec::new(),
            });
            return Ok(());
        }

        // Function definition end
        if regex!(r"^\s*endfunction\s*$").is_match(line) {
            let Some(function_def) = self.function_def.take() else {
                return Err(self.error("No matching function definition", line, line_index));
            };
            self.close_function(function_def);
            return Ok(());
        }

        // If-then begin
        if let Some(captures) = regex!(r"^\s*if\s+(.+)\s+then\s*$").captures(line) {
            let expr_match = capture(&captures, 1);
            let expr =
                self.parse_embedded(expr_match.as_str(), line, line_index, expr_match.start())?;
            let index = self.next_label_index();
            let jump_label = format!("__scriptIf{index}");
            let done = format!("__scriptDone{index}");
            let jump = self.emit(Statement::Jump(JumpStatement {
                label: jump_label.clone(),
                expr: Some(Expression::unary(UnaryOperator::Not, expr)),
            }));
            self.block_stack.push(BlockContext::IfThen(IfThenContext {
                jump,
                jump_label,
                done,
                has_else: false,
                line: line.to_string(),
                line_number: self.start_line_number + line_index,
            }));
            return Ok(());
        }

        // Else-if-then
        if let Some(captures) = regex!(r"^\s*else\s+if\s+(.+)\s+then\s*$").captures(line) {
            let (done, previous_label) = match self.block_stack.last() {
                Some(BlockContext::IfThen(context)) if context.has_else => {
                    return Err(self.error(
                        "Else-if-then statement following else-then statement",
                        line,
                        line_index,
                    ));
                }
                Some(BlockContext::IfThen(context)) => {
                    (context.done.clone(), context.jump_label.clone())
                }
                _ => return Err(self.error("No matching if-then statement", line, line_index)),
            };
            let expr_match = capture(&captures, 1);
            let expr =
                self.parse_embedded(expr_match.as_str(), line, line_index, expr_match.start())?;
            let index = self.next_label_index();
            let new_label = format!("__scriptIf{index}");
            self.emit(Statement::Jump(JumpStatement {
                label: done,
                expr: None,
            }));
            self.emit(Statement::Label(previous_label));
            let jump = self.emit(Statement::Jump(JumpStatement {
                label: new_label.clone(),
                expr: Some(Expression::unary(UnaryOperator::Not, expr)),
            }));
            let Some(BlockContext::IfThen(context)) = self.block_stack.last_mut() else {
                unreachable!("if-then context checked above");
            };
            context.jump = jump;
            context.jump_label = new_label;
            return Ok(());
        }

        // Else-then
        if regex!(r"^\s*else\s+then\s*$").is_match(line) {
            let (done, previous_label) = match self.block_stack.last_mut() {
                Some(BlockContext::IfThen(context)) if context.has_else => {
                    return Err(self.error("Multiple else-then statements", line, line_index));
                }
                Some(BlockContext::IfThen(context)) => {
                    context.has_else = true;
                    (context.done.clone(), context.jump_label.clone())
                }
                _ => return Err(self.error("No matching if-then statement", line, line_index)),
            };
            self.emit(Statement::Jump(JumpStatement {
                label: done,
                expr: None,
            }));
            self.emit(Statement::Label(previous_label));
            return Ok(());
        }

        // If-then end
        if regex!(r"^\s*endif\s*$").is_match(line) {
            if !matches!(self.block_stack.last(), Some(BlockContext::IfThen(_))) {
                return Err(self.error("No matching if-then statement", line, line_index));
            }
            let Some(BlockContext::IfThen(context)) = self.block_stack.pop() else {
                unreachable!("if-then context checked above");
            };
            if !context.has_else {
                self.retarget_jump(&context.jump, context.done.clone());
            }
            self.emit(Statement::Label(context.done));
            return Ok(());
        }

        // While begin
        if let Some(captures) = regex!(r"^\s*while\s+(.+)\s+do\s*$").captures(line) {
            let expr_match = capture(&captures, 1);
            let expr =
                self.parse_embedded(expr_match.as_str(), line, line_index, expr_match.start())?;
            let index = self.next_label_index();
            let loop_label = format!("__scriptLoop{index}");
            let done = format!("__scriptDone{index}");
            self.emit(Statement::Jump(JumpStatement {
                label: done.clone(),
                expr: Some(Expression::unary(UnaryOperator::Not, expr.clone())),
            }));
            self.emit(Statement::Label(loop_label.clone()));
            self.block_stack.push(BlockContext::While(WhileContext {
                loop_label,
                done,
                expr,
                line: line.to_string(),
                line_number: self.start_line_number + line_index,
            }));
            return Ok(());
        }

        // While end
        if regex!(r"^\s*endwhile\s*$").is_match(line) {
            if !matches!(self.block_stack.last(), Some(BlockContext::While(_))) {
                return Err(self.error("No matching while-do statement", line, line_index));
            }
            let Some(BlockContext::While(context)) = self.block_stack.pop() else {
                unreachable!("while context checked above");
            };
            self.emit(Statement::Jump(JumpStatement {
                label: context.loop_label,
                expr: Some(context.expr),
            }));
            self.emit(Statement::Label(context.done));
            return Ok(());
        }

        // Foreach begin
        if let Some(captures) = regex!(
            r"^\s*foreach\s+([A-Za-z_][A-Za-z0-9_]*)(?:\s*,\s*([A-Za-z_][A-Za-z0-9_]*))?\s+in\s+(.+)\s+do\s*$"
        )
        .captures(line)
        {
            let value_name = capture(&captures, 1).as_str().to_string();
            let explicit_index = captures.get(2).map(|group| group.as_str().to_string());
            let values_match = capture(&captures, 3);
            let values_expr = self.parse_embedded(
                values_match.as_str(),
                line,
                line_index,
                values_match.start(),
            )?;
            let index = self.next_label_index();
            let loop_label = format!("__scriptLoop{index}");
            let continue_label = format!("__scriptContinue{index}");
            let done = format!("__scriptDone{index}");
            let values_name = format!("__scriptValues{index}");
            let length_name = format!("__scriptLength{index}");
            let index_name = explicit_index.unwrap_or_else(|| format!("__scriptIndex{index}"));

            self.emit(Statement::Expr(ExprStatement {
                name: Some(values_name.clone()),
                expr: values_expr,
            }));
            self.emit(Statement::Expr(ExprStatement {
                name: Some(length_name.clone()),
                expr: Expression::call(
                    "arrayLength",
                    vec![Expression::variable(values_name.clone())],
                ),
            }));
            self.emit(Statement::Jump(JumpStatement {
                label: done.clone(),
                expr: Some(Expression::unary(
                    UnaryOperator::Not,
                    Expression::variable(length_name.clone()),
                )),
            }));
            self.emit(Statement::Expr(ExprStatement {
                name: Some(index_name.clone()),
                expr: Expression::Number(0.0),
            }));
            self.emit(Statement::Label(loop_label.clone()));
            self.emit(Statement::Expr(ExprStatement {
                name: Some(value_name),
                expr: Expression::call(
                    "arrayGet",
                    vec![
                        Expression::variable(values_name),
                        Expression::variable(index_name.clone()),
                    ],
                ),
            }));
            self.block_stack.push(BlockContext::Foreach(ForeachContext {
                loop_label,
                continue_label,
                done,
                index: index_name,
                length: length_name,
                has_continue: false,
                line: line.to_string(),
                line_number: self.start_line_number + line_index,
            }));
            return Ok(());
        }

        // Foreach end
        if regex!(r"^\s*endforeach\s*$").is_match(line) {
            if !matches!(self.block_stack.last(), Some(BlockContext::Foreach(_))) {
                return Err(self.error("No matching foreach statement", line, line_index));
            }
            let Some(BlockContext::Foreach(context)) = self.block_stack.pop() else {
                unreachable!("foreach context checked above");
            };
            if context.has_continue {
                self.emit(Statement::Label(context.continue_label));
            }
            self.emit(Statement::Expr(ExprStatement {
                name: Some(context.index.clone()),
                expr: Expression::binary(
                    BinaryOperator::Add,
                    Expression::variable(context.index.clone()),
                    Expression::Number(1.0),
                ),
            }));
            self.emit(Statement::Jump(JumpStatement {
                label: context.loop_label,
                expr: Some(Expression::binary(
                    BinaryOperator::Less,
                    Expression::variable(context.index),
                    Expression::variable(context.length),
                )),
            }));
            self.emit(Statement::Label(context.done));
            return Ok(());
        }

        // Break
        if regex!(r"^\s*break\s*$").is_match(line) {
            let Some(done) = self.break_target() else {
                return Err(self.error("Break statement outside of loop", line, line_index));
            };
            self.emit(Statement::Jump(JumpStatement {
                label: done,
                expr: None,
            }));
            return Ok(());
        }

        // Continue
        if regex!(r"^\s*continue\s*$").is_match(line) {
            let Some(target) = self.continue_target() else {
                return Err(self.error("Continue statement outside of loop", line, line_index));
            };
            self.emit(Statement::Jump(JumpStatement {
                label: target,
                expr: None,
            }));
            return Ok(());
        }

        // Label
        if let Some(captures) = regex!(r"^\s*([A-Za-z_][A-Za-z0-9_]*)\s*:\s*$").captures(line) {
            self.emit(Statement::Label(capture(&captures, 1).as_str().to_string()));
            return Ok(());
        }

        // Jump / conditional jump
        if let Some(captures) =
            regex!(r"^\s*(?:jump|jumpif\s*\((.+)\))\s+([A-Za-z_][A-Za-z0-9_]*)\s*$").captures(line)
        {
            let expr = match captures.get(1) {
                Some(expr_match) => Some(self.parse_embedded(
                    expr_match.as_str(),
                    line,
                    line_index,
                    expr_match.start(),
                )?),
                None => None,
            };
            self.emit(Statement::Jump(JumpStatement {
                label: capture(&captures, 2).as_str().to_string(),
                expr,
            }));
            return Ok(());
        }

        // Return
        if let Some(captures) = regex!(r"^\s*return(?:\s+(.+?))?\s*$").captures(line) {
            let expr = match captures.get(1) {
                Some(expr_match) => Some(self.parse_embedded(
                    expr_match.as_str(),
                    line,
                    line_index,
                    expr_match.start(),
                )?),
                None => None,
            };
            self.emit(Statement::Return(ReturnStatement { expr }));
            return Ok(());
        }

        // Include
        if let Some(captures) = regex!(r"^\s*include\s+'((?:\\'|\\\\|[^'])*)'\s*$").captures(line)
        {
            let url = expression::unescape(capture(&captures, 1).as_str(), '\'');
            self.emit(Statement::Include(url));
            return Ok(());
        }
        if let Some(captures) =
            regex!(r#"^\s*include\s+"((?:\\"|\\\\|[^"])*)"\s*$"#).captures(line)
        {
            let url = expression::unescape(capture(&captures, 1).as_str(), '"');
            self.emit(Statement::Include(url));
            return Ok(());
        }

        // Fallthrough: bare expression statement
        let expr = self.parse_embedded(line, line, line_index, 0)?;
        self.emit(Statement::Expr(ExprStatement { name: None, expr }));
        Ok(())
    }

    fn finish(mut self) -> ParseResult<Script> {
        if let Some(context) = self.block_stack.last() {
            let (kind, line, line_number) = match context {
                BlockContext::IfThen(context) => ("endif", &context.line, context.line_number),
                BlockContext::While(context) => ("endwhile", &context.line, context.line_number),
                BlockContext::Foreach(context) => {
                    ("endforeach", &context.line, context.line_number)
                }
            };
            return Err(
                ParserError::new(format!("Missing {kind} statement"), line.clone())
                    .with_line_number(line_number),
            );
        }
        // A function definition left open runs to end-of-input.
        if let Some(function_def) = self.function_def.take() {
            self.close_function(function_def);
        }
        Ok(Script {
            statements: self.statements,
        })
    }

    /// Append to the open function definition when there is one, otherwise
    /// to the top level. Returns where the statement landed.
    fn emit(&mut self, statement: Statement) -> JumpSlot {
        match &mut self.function_def {
            Some(function_def) => {
                function_def.statements.push(statement);
                JumpSlot::OpenFunction(function_def.statements.len() - 1)
            }
            None => {
                self.statements.push(statement);
                JumpSlot::TopLevel(self.statements.len() - 1)
            }
        }
    }

    /// Finish a function definition and append it to the top level. Any
    /// if-then contexts still referencing jumps inside the body are remapped
    /// so later retargeting finds them inside the finished statement.
    fn close_function(&mut self, function_def: FunctionDef) {
        let function_index = self.statements.len();
        for context in &mut self.block_stack {
            if let BlockContext::IfThen(context) = context {
                if let JumpSlot::OpenFunction(statement) = context.jump {
                    context.jump = JumpSlot::ClosedFunction {
                        function: function_index,
                        statement,
                    };
                }
            }
        }
        self.statements.push(Statement::Function(FunctionStatement {
            name: function_def.name,
            args: function_def.args,
            statements: function_def.statements,
            is_async: function_def.is_async,
        }));
    }

    fn retarget_jump(&mut self, slot: &JumpSlot, label: String) {
        let statement = match slot {
            JumpSlot::TopLevel(index) => self.statements.get_mut(*index),
            JumpSlot::OpenFunction(index) => self
                .function_def
                .as_mut()
                .and_then(|function_def| function_def.statements.get_mut(*index)),
            JumpSlot::ClosedFunction {
                function,
                statement,
            } => match self.statements.get_mut(*function) {
                Some(Statement::Function(function_def)) => {
                    function_def.statements.get_mut(*statement)
                }
                _ => None,
            },
        };
        match statement {
            Some(Statement::Jump(jump)) => jump.label = label,
            _ => unreachable!("if-then context always references an emitted jump"),
        }
    }

    /// Topmost block context that is not an if-then.
    fn innermost_loop_mut(&mut self) -> Option<&mut BlockContext> {
        self.block_stack
            .iter_mut()
            .rev()
            .find(|context| !matches!(context, BlockContext::IfThen(_)))
    }

    /// Done label of the innermost loop, if any.
    fn break_target(&mut self) -> Option<String> {
        match self.innermost_loop_mut()? {
            BlockContext::While(context) => Some(context.done.clone()),
            BlockContext::Foreach(context) => Some(context.done.clone()),
            BlockContext::IfThen(_) => unreachable!("loop search skips if-then contexts"),
        }
    }

    /// Continue label of the innermost loop, if any. Foreach loops are
    /// flagged so their footer emits the label.
    fn continue_target(&mut self) -> Option<String> {
        match self.innermost_loop_mut()? {
            BlockContext::While(context) => Some(context.loop_label.clone()),
            BlockContext::Foreach(context) => {
                context.has_continue = true;
                Some(context.continue_label.clone())
            }
            BlockContext::IfThen(_) => unreachable!("loop search skips if-then contexts"),
        }
    }

    fn next_label_index(&mut self) -> usize {
        let index = self.label_index;
        self.label_index += 1;
        index
    }

    /// Parse an expression embedded in `line` at byte offset `offset`,
    /// repointing any failure at its position within the source line.
    fn parse_embedded(
        &self,
        text: &str,
        line: &str,
        line_index: usize,
        offset: usize,
    ) -> ParseResult<Expression> {
        expression::parse(text).map_err(|error| {
            ParserError::new(error.to_string(), line)
                .with_column(expression::char_column(line, offset + error.offset()))
                .with_line_number(self.start_line_number + line_index)
        })
    }

    fn error(&self, message: &str, line: &str, line_index: usize) -> ParserError {
        ParserError::new(message, line).with_line_number(self.start_line_number + line_index)
    }
}

fn capture<'t>(captures: &Captures<'t>, index: usize) -> regex::Match<'t> {
    match captures.get(index) {
        Some(group) => group,
        None => unreachable!("capture group {index} always participates in a match"),
    }
}
