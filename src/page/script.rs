//! Scripts evaluated in the live document. `arguments[0]` is always the
//! process table selector where one is taken.

pub(crate) const READY_STATE: &str = "return document.readyState;";

pub(crate) const HAS_ELEMENT: &str = "return !!document.querySelector(arguments[0]);";

pub(crate) const BODY_TEXT: &str = "return document.body ? document.body.innerText : '';";

/// Prefixes `$body` with `dataRows`: the process rows of the table, without
/// the header row, subtitle rows or rows holding no cells.
macro_rules! with_data_rows {
    ($body:literal) => {
        concat!(
            r#"
const table = document.querySelector(arguments[0]);
const dataRows = table
    ? Array.from(table.querySelectorAll('tr'))
          .slice(1)
          .filter((row) => !row.classList.contains('processList--subtitle'))
          .filter((row) => row.querySelector('td'))
    : [];
"#,
            $body
        )
    };
}

pub(crate) const ROW_COUNT: &str = with_data_rows!("return dataRows.length;");

/// Mirrors `snapshot::extract_rows`; keep the two projections in step.
pub(crate) const EXTRACT_ROWS: &str = with_data_rows!(
    r#"
const text = (cell) => (cell ? cell.textContent.trim() : '');
return dataRows.map((row) => {
    const cells = Array.from(row.querySelectorAll('td'));
    const links = cells[6] ? Array.from(cells[6].querySelectorAll('a')) : [];
    return {
        material: text(cells[1]),
        reactantA: text(cells[2]),
        reactantB: text(cells[3]),
        reactantC: text(cells[4]),
        furtherReactants: text(cells[5]),
        references: links.map((link) => ({
            name: link.textContent.trim(),
            url: link.href,
        })),
    };
});
"#
);
