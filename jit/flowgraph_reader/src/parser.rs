//! Parser for the textual form of block graphs.

use flowgraph::eh::{EhRegion, HandlerKind};
use flowgraph::{
    Block, BlockFlags, BlockGraph, DominantCase, JumpKind, Local, LoopDesc, SwitchTable, Weight,
};
use smallvec::SmallVec;

use crate::error::{Location, ParseResult};
use crate::ir::{BinOp, Expr, Operand, RelOp, Stmt};
use crate::lexer::{LexError, Lexer, LocatedError, LocatedToken, Token};
use crate::ParseError;

#[cfg(test)]
mod tests;

/// Parse the entire `text` into a block graph.
///
/// The predecessors are computed from the jumps, the graph is numbered and validated.
pub fn parse_graph(text: &str) -> ParseResult<BlockGraph<Stmt>> {
    let mut parser = Parser::new(text);
    parser.parse_graph()
}

pub struct Parser<'a> {
    lex: Lexer<'a>,

    lex_error: Option<LexError>,

    /// Current lookahead token.
    lookahead: Option<Token<'a>>,

    /// Location of lookahead.
    loc: Location,
}

/// A line of a block body.
enum Line {
    Stmt(Stmt),
    Jump(JumpKind),
}

/// The graph under construction. Regions and loops refer to the layout, so they are only
/// added once every block has been parsed.
#[derive(Default)]
struct Context {
    graph: BlockGraph<Stmt>,
    regions: Vec<(Location, EhRegion)>,
    loops: Vec<LoopDesc>,
}

impl Context {
    // Allocate arena entries up to `block`.
    fn declare_block(&mut self, block: Block) -> Block {
        while self.graph.arena_len() <= block.index() {
            self.graph.create_block(JumpKind::Throw);
        }
        block
    }

    fn finish(mut self, loc: Location) -> ParseResult<BlockGraph<Stmt>> {
        for (loc, region) in self.regions {
            let blocks = [region.try_begin, region.try_last, region.hnd_begin, region.hnd_last];
            let filter = region.filter_begin.expand();
            if let Some(block) =
                blocks.into_iter().chain(filter).find(|&block| !self.graph.is_in_layout(block))
            {
                return err!(loc, "region refers to the undefined block {}", block);
            }
            self.graph.add_eh_region(region);
        }
        for desc in self.loops {
            self.graph.loops.push(desc);
        }
        self.graph.compute_preds();
        self.graph.renumber();
        if let Err(err) = self.graph.validate() {
            return err!(loc, "invalid graph: {}", err);
        }
        Ok(self.graph)
    }
}

impl<'a> Parser<'a> {
    /// Create a new `Parser` which reads `text`. The referenced text must outlive the parser.
    pub fn new(text: &'a str) -> Self {
        Self {
            lex: Lexer::new(text),
            lex_error: None,
            lookahead: None,
            loc: Location { line_number: 0 },
        }
    }

    // Consume the current lookahead token.
    fn consume(&mut self) {
        debug_assert!(self.lookahead.is_some(), "no token to consume");
        self.lookahead = None;
    }

    // Get the current lookahead token, after making sure there is one. Comments are skipped.
    fn token(&mut self) -> Option<Token<'a>> {
        while self.lookahead.is_none() {
            match self.lex.next() {
                Some(Ok(LocatedToken { token: Token::Comment(_), location })) => {
                    self.loc = location;
                }
                Some(Ok(LocatedToken { token, location })) => {
                    self.lookahead = Some(token);
                    self.loc = location;
                }
                Some(Err(LocatedError { error, location })) => {
                    self.lex_error = Some(error);
                    self.loc = location;
                    break;
                }
                None => break,
            }
        }
        self.lookahead
    }

    // Match and consume a token without payload.
    fn match_token(&mut self, want: Token<'a>, err_msg: &str) -> ParseResult<()> {
        if self.token() == Some(want) {
            self.consume();
            Ok(())
        } else {
            err!(self.loc, err_msg)
        }
    }

    // If the next token is a `want`, consume it, otherwise do nothing.
    fn optional(&mut self, want: Token<'a>) -> bool {
        if self.token() == Some(want) {
            self.consume();
            true
        } else {
            false
        }
    }

    // Match and consume a specific identifier string.
    fn match_identifier(&mut self, want: &'static str, err_msg: &str) -> ParseResult<()> {
        self.match_token(Token::Identifier(want), err_msg)
    }

    // Match and consume an identifier.
    fn match_any_identifier(&mut self, err_msg: &str) -> ParseResult<&'a str> {
        if let Some(Token::Identifier(text)) = self.token() {
            self.consume();
            Ok(text)
        } else {
            err!(self.loc, err_msg)
        }
    }

    // Match and consume a block reference.
    fn match_block(&mut self, ctx: &mut Context, err_msg: &str) -> ParseResult<Block> {
        if let Some(Token::Block(block)) = self.token() {
            self.consume();
            Ok(ctx.declare_block(block))
        } else {
            err!(self.loc, err_msg)
        }
    }

    // Match and consume a function reference.
    fn match_fn(&mut self, err_msg: &str) -> ParseResult<u32> {
        if let Some(Token::Func(func)) = self.token() {
            self.consume();
            Ok(func)
        } else {
            err!(self.loc, err_msg)
        }
    }

    fn match_local(&mut self, err_msg: &str) -> ParseResult<Local> {
        if let Some(Token::Local(local)) = self.token() {
            self.consume();
            Ok(local)
        } else {
            err!(self.loc, err_msg)
        }
    }

    // Match and consume an integer immediate.
    fn match_imm(&mut self, err_msg: &str) -> ParseResult<i64> {
        if let Some(Token::Integer(text)) = self.token() {
            self.consume();
            text.replace('_', "").parse().map_err(|_| self.error("expected decimal immediate"))
        } else {
            err!(self.loc, err_msg)
        }
    }

    // Match and consume a non-negative number, either an integer or a float.
    fn match_number(&mut self, err_msg: &str) -> ParseResult<f64> {
        match self.token() {
            Some(Token::Integer(text) | Token::Float(text)) => {
                self.consume();
                match text.replace('_', "").parse::<f64>() {
                    Ok(val) if val >= 0.0 => Ok(val),
                    _ => err!(self.loc, "expected a non-negative number"),
                }
            }
            _ => err!(self.loc, err_msg),
        }
    }

    fn match_operand(&mut self, err_msg: &str) -> ParseResult<Operand> {
        match self.token() {
            Some(Token::Local(local)) => {
                self.consume();
                Ok(Operand::Local(local))
            }
            Some(Token::Integer(_)) => Ok(Operand::Const(self.match_imm(err_msg)?)),
            _ => err!(self.loc, err_msg),
        }
    }

    // Parse the two operands of a binary operation.
    fn parse_operand_pair(&mut self) -> ParseResult<(Operand, Operand)> {
        let lhs = self.match_operand("expected an operand")?;
        self.match_token(Token::Comma, "expected ',' between operands")?;
        let rhs = self.match_operand("expected an operand")?;
        Ok((lhs, rhs))
    }

    fn error(&self, message: &str) -> ParseError {
        ParseError { location: self.loc, message: message.to_string() }
    }

    fn check_lex_error(&self) -> ParseResult<()> {
        match self.lex_error {
            Some(LexError::InvalidChar) => err!(self.loc, "invalid character"),
            None => Ok(()),
        }
    }

    /// Parse a whole graph.
    ///
    /// graph ::= [graph-attrs] { eh-decl | loop-decl } { block }
    pub fn parse_graph(&mut self) -> ParseResult<BlockGraph<Stmt>> {
        let mut ctx = Context::default();

        if self.token() == Some(Token::Identifier("graph")) {
            self.parse_graph_attrs(&mut ctx)?;
        }

        loop {
            match self.token() {
                Some(Token::Eh(idx)) => self.parse_eh_decl(&mut ctx, idx)?,
                Some(Token::Loop(idx)) => self.parse_loop_decl(&mut ctx, idx)?,
                _ => break,
            }
        }

        while self.token().is_some() {
            self.parse_block(&mut ctx)?;
        }
        self.check_lex_error()?;

        ctx.finish(self.loc)
    }

    // graph-attrs ::= "graph" "[" graph-attr { "," graph-attr } "]"
    // graph-attr  ::= "return" "=" Block | "scratch" "=" Block | "cold" "=" Block
    //               | "profile" | "edge_weights"
    fn parse_graph_attrs(&mut self, ctx: &mut Context) -> ParseResult<()> {
        self.match_identifier("graph", "expected 'graph'")?;
        self.match_token(Token::LBracket, "expected '[' after 'graph'")?;
        loop {
            let name = self.match_any_identifier("expected a graph attribute")?;
            match name {
                "return" | "scratch" | "cold" => {
                    self.match_token(Token::Equal, "expected '=' after attribute name")?;
                    let block = self.match_block(ctx, "expected a block")?;
                    let dst = match name {
                        "return" => &mut ctx.graph.return_block,
                        "scratch" => &mut ctx.graph.scratch,
                        _ => &mut ctx.graph.first_cold,
                    };
                    *dst = block.into();
                }
                "profile" => ctx.graph.using_profile_weights = true,
                "edge_weights" => ctx.graph.have_valid_edge_weights = true,
                _ => return err!(self.loc, "unknown graph attribute '{}'", name),
            }
            if !self.optional(Token::Comma) {
                break;
            }
        }
        self.match_token(Token::RBracket, "expected ']' after graph attributes")
    }

    // eh-decl ::= Eh(n) kind "try" Block ".." Block ["filter" Block] "handler" Block ".." Block
    fn parse_eh_decl(&mut self, ctx: &mut Context, idx: u32) -> ParseResult<()> {
        let loc = self.loc;
        self.consume();
        if idx as usize != ctx.regions.len() {
            return err!(loc, "expected eh{}", ctx.regions.len());
        }

        let kind = match self.match_any_identifier("expected a handler kind")? {
            "catch" => HandlerKind::Catch,
            "filter" => HandlerKind::Filter,
            "finally" => HandlerKind::Finally,
            "fault" => HandlerKind::Fault,
            kind => return err!(self.loc, "unknown handler kind '{}'", kind),
        };
        self.match_identifier("try", "expected 'try'")?;
        let (try_begin, try_last) = self.parse_block_range(ctx)?;
        let filter_begin = if self.optional(Token::Identifier("filter")) {
            Some(self.match_block(ctx, "expected the filter block")?)
        } else {
            None
        };
        self.match_identifier("handler", "expected 'handler'")?;
        let (hnd_begin, hnd_last) = self.parse_block_range(ctx)?;

        let region = EhRegion {
            kind,
            try_begin,
            try_last,
            hnd_begin,
            hnd_last,
            filter_begin: filter_begin.into(),
            enclosing_try: None.into(),
        };
        ctx.regions.push((loc, region));
        Ok(())
    }

    fn parse_block_range(&mut self, ctx: &mut Context) -> ParseResult<(Block, Block)> {
        let first = self.match_block(ctx, "expected the first block of the range")?;
        self.match_token(Token::DotDot, "expected '..'")?;
        let last = self.match_block(ctx, "expected the last block of the range")?;
        Ok((first, last))
    }

    // loop-decl ::= Loop(n) "top" Block "entry" Block "bottom" Block ["head" Block] ["exit" Block]
    fn parse_loop_decl(&mut self, ctx: &mut Context, idx: u32) -> ParseResult<()> {
        let loc = self.loc;
        self.consume();
        if idx as usize != ctx.loops.len() {
            return err!(loc, "expected loop{}", ctx.loops.len());
        }

        self.match_identifier("top", "expected 'top'")?;
        let top = self.match_block(ctx, "expected the top block")?;
        self.match_identifier("entry", "expected 'entry'")?;
        let entry = self.match_block(ctx, "expected the entry block")?;
        self.match_identifier("bottom", "expected 'bottom'")?;
        let bottom = self.match_block(ctx, "expected the bottom block")?;
        let mut desc =
            LoopDesc { head: None.into(), top, entry, bottom, exit: None.into(), removed: false };
        if self.optional(Token::Identifier("head")) {
            desc.head = self.match_block(ctx, "expected the head block")?.into();
        }
        if self.optional(Token::Identifier("exit")) {
            desc.exit = self.match_block(ctx, "expected the exit block")?.into();
        }
        ctx.loops.push(desc);
        Ok(())
    }

    // Parse a basic block, add contents to `ctx`.
    //
    // block        ::= * Block(b) [block-attrs] ":" { stmt } jump
    // block-attrs  ::= "[" block-attr { "," block-attr } "]"
    // block-attr   ::= "weight" "=" number | flag-name
    fn parse_block(&mut self, ctx: &mut Context) -> ParseResult<()> {
        let block = self.match_block(ctx, "expected block header")?;
        if ctx.graph.is_in_layout(block) {
            return err!(self.loc, "duplicate definition of {}", block);
        }

        if self.optional(Token::LBracket) {
            loop {
                self.parse_block_attr(ctx, block)?;
                if !self.optional(Token::Comma) {
                    break;
                }
            }
            self.match_token(Token::RBracket, "expected ']' after block attributes")?;
        }
        self.match_token(Token::Colon, "expected ':' after block header")?;

        let mut stmts = Vec::new();
        let jump = loop {
            match self.parse_line(ctx)? {
                Line::Stmt(stmt) => stmts.push(stmt),
                Line::Jump(jump) => break jump,
            }
        };

        let data = &mut ctx.graph[block];
        data.stmts = stmts;
        data.jump = jump;
        ctx.graph.append_block(block);
        Ok(())
    }

    fn parse_block_attr(&mut self, ctx: &mut Context, block: Block) -> ParseResult<()> {
        let name = self.match_any_identifier("expected a block attribute")?;
        if name == "weight" {
            self.match_token(Token::Equal, "expected '=' after 'weight'")?;
            let weight: Weight = self.match_number("expected the block weight")?;
            ctx.graph[block].weight = weight;
            return Ok(());
        }
        match BlockFlags::from_name(&name.to_ascii_uppercase()) {
            Some(flag) => {
                ctx.graph[block].flags.insert(flag);
                Ok(())
            }
            None => err!(self.loc, "unknown block flag '{}'", name),
        }
    }

    // Parse a statement or the jump that ends the block.
    fn parse_line(&mut self, ctx: &mut Context) -> ParseResult<Line> {
        let keyword = match self.token() {
            Some(Token::Local(dst)) => {
                self.consume();
                self.match_token(Token::Equal, "expected '=' after the stored local")?;
                let value = self.parse_expr()?;
                return Ok(Line::Stmt(Stmt::Store { dst, value }));
            }
            Some(Token::Identifier(keyword)) => keyword,
            _ => return err!(self.loc, "expected a statement or a jump"),
        };
        self.consume();

        let line = match keyword {
            "nop" => Line::Stmt(Stmt::Nop),
            "call" | "tailcall" => {
                let func = self.match_fn("expected a function")?;
                Line::Stmt(Stmt::Call { func, tail: keyword == "tailcall" })
            }
            "jtrue" => {
                let op = self.parse_relop()?;
                let (lhs, rhs) = self.parse_operand_pair()?;
                Line::Stmt(Stmt::JumpTrue(op, lhs, rhs))
            }
            "ret" => match self.token() {
                Some(Token::Local(_) | Token::Integer(_)) => {
                    let val = self.match_operand("expected the returned value")?;
                    Line::Stmt(Stmt::Ret(Some(val)))
                }
                _ => Line::Stmt(Stmt::Ret(None)),
            },
            "switch" if self.token() != Some(Token::LBracket) => {
                Line::Stmt(Stmt::Switch(self.match_operand("expected the switch value")?))
            }

            "jmp" => Line::Jump(JumpKind::Always(self.match_block(ctx, "expected the target")?)),
            "cond" => Line::Jump(JumpKind::Cond(self.match_block(ctx, "expected the target")?)),
            "switch" => {
                let targets = self.parse_block_list::<[Block; 4]>(ctx)?.into_vec();
                let mut table = SwitchTable::new(targets);
                if self.optional(Token::Identifier("dominant")) {
                    let case = self.match_imm("expected the dominant case")?;
                    let fraction = self.match_number("expected the fraction of the dominant case")?;
                    if case < 0 || case as usize >= table.targets.len() {
                        return err!(self.loc, "dominant case {} is out of range", case);
                    }
                    table.dominant = Some(DominantCase { case: case as usize, fraction });
                }
                Line::Jump(JumpKind::Switch(table))
            }
            "return" => Line::Jump(JumpKind::Return),
            "throw" => Line::Jump(JumpKind::Throw),
            "callhandler" => {
                Line::Jump(JumpKind::CallHandler(self.match_block(ctx, "expected the handler")?))
            }
            "handlerret" => Line::Jump(JumpKind::HandlerReturn(self.parse_block_list(ctx)?)),
            "filterret" => {
                Line::Jump(JumpKind::FilterReturn(self.match_block(ctx, "expected the handler")?))
            }
            "catchret" => {
                Line::Jump(JumpKind::CatchReturn(self.match_block(ctx, "expected the target")?))
            }
            "faultret" => Line::Jump(JumpKind::FaultReturn),
            _ => return err!(self.loc, "unknown statement '{}'", keyword),
        };
        Ok(line)
    }

    // block-list ::= "[" [Block { "," Block }] "]"
    fn parse_block_list<A: smallvec::Array<Item = Block>>(
        &mut self,
        ctx: &mut Context,
    ) -> ParseResult<SmallVec<A>> {
        self.match_token(Token::LBracket, "expected '['")?;
        let mut list = SmallVec::new();
        if self.token() != Some(Token::RBracket) {
            loop {
                list.push(self.match_block(ctx, "expected a block")?);
                if !self.optional(Token::Comma) {
                    break;
                }
            }
        }
        self.match_token(Token::RBracket, "expected ']'")?;
        Ok(list)
    }

    fn parse_relop(&mut self) -> ParseResult<RelOp> {
        let name = self.match_any_identifier("expected a relational operator")?;
        match RelOp::from_name(name) {
            Some(op) => Ok(op),
            None => err!(self.loc, "unknown relational operator '{}'", name),
        }
    }

    // expr ::= operand | binop operand "," operand | relop operand "," operand
    //        | "len" Local | "call" Func
    fn parse_expr(&mut self) -> ParseResult<Expr> {
        let name = match self.token() {
            Some(Token::Local(_) | Token::Integer(_)) => {
                return Ok(Expr::Use(self.match_operand("expected an operand")?))
            }
            Some(Token::Identifier(name)) => name,
            _ => return err!(self.loc, "expected an expression"),
        };
        self.consume();

        if let Some(op) = BinOp::from_name(name) {
            let (lhs, rhs) = self.parse_operand_pair()?;
            return Ok(Expr::Binary(op, lhs, rhs));
        }
        if let Some(op) = RelOp::from_name(name) {
            let (lhs, rhs) = self.parse_operand_pair()?;
            return Ok(Expr::Compare(op, lhs, rhs));
        }
        match name {
            "len" => Ok(Expr::Len(self.match_local("expected a local")?)),
            "call" => Ok(Expr::Call(self.match_fn("expected a function")?)),
            _ => err!(self.loc, "unknown operator '{}'", name),
        }
    }
}
