use ll1_syntax::{elem, recursive, ParseResult, Parser, Token, Value};

// > cargo run --example arith
// (1 + 2) * 3 = 9

#[derive(Debug, Clone, Copy, PartialEq)]
enum Tok {
    Num(i64),
    Plus,
    Star,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Num,
    Plus,
    Star,
    Open,
    Close,
}

impl Token for Tok {
    type Kind = Kind;

    fn kind(&self) -> Kind {
        match self {
            Tok::Num(_) => Kind::Num,
            Tok::Plus => Kind::Plus,
            Tok::Star => Kind::Star,
            Tok::Open => Kind::Open,
            Tok::Close => Kind::Close,
        }
    }
}

fn int(value: &Value<Tok>) -> i64 {
    value.downcast_ref::<i64>().copied().unwrap_or(0)
}

// expr   := term ('+' term)*
// term   := factor ('*' factor)*
// factor := number | '(' expr ')'
fn arithmetic() -> Parser<Tok> {
    recursive(|expr| {
        let number = elem(Kind::Num).map(|value| match value.as_token() {
            Some(Tok::Num(n)) => Value::of(*n),
            _ => Value::of(0i64),
        });
        let parens = expr
            .preceded(&elem(Kind::Open))
            .terminated(&elem(Kind::Close));
        let factor = number.or(&parens);

        let term = factor
            .prepend(&factor.preceded(&elem(Kind::Star)).many0())
            .map(|value| {
                let product: i64 = value
                    .as_seq()
                    .map_or(1, |items| items.iter().map(int).product());
                Value::of(product)
            });

        term.prepend(&term.preceded(&elem(Kind::Plus)).many0())
            .map(|value| {
                let sum: i64 = value
                    .as_seq()
                    .map_or(0, |items| items.iter().map(int).sum());
                Value::of(sum)
            })
    })
}

fn main() {
    let expr = arithmetic();
    assert!(expr.is_ll1());

    // (1 + 2) * 3
    let input = vec![
        Tok::Open,
        Tok::Num(1),
        Tok::Plus,
        Tok::Num(2),
        Tok::Close,
        Tok::Star,
        Tok::Num(3),
    ];

    match expr.apply(input) {
        ParseResult::Parsed { value, .. } => {
            println!("(1 + 2) * 3 = {}", int(&value));
        }
        ParseResult::UnexpectedToken { token, residual } => {
            println!(
                "unexpected {:?}; expected one of {:?}",
                token,
                residual.first()
            );
        }
        ParseResult::UnexpectedEnd { residual } => {
            println!("input ended; expected one of {:?}", residual.first());
        }
    }

    // The shapes of the five shortest inputs the grammar accepts.
    for trail in expr.trails().take(5) {
        println!("accepts: {:?}", trail);
    }
}
